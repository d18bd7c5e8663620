//! Sensitive-key redaction for error context maps.
//!
//! Recognized keys are matched case-insensitively. The default set is
//! compile-time fixed; callers may extend it at runtime via
//! [`add_sensitive_key`]. Sanitization never mutates its input.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde_json::{json, Value};

pub const REDACTED_PLACEHOLDER: &str = "***REDACTED***";
pub const MAX_CONTEXT_SIZE_BYTES: usize = 1024;

const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "access_token",
    "refresh_token",
    "secret",
    "secret_key",
    "api_key",
    "apikey",
    "credential",
    "credentials",
    "auth",
    "authorization",
    "private_key",
    "broker_id",
    "investor_id",
    "auth_code",
    "app_id",
];

lazy_static! {
    static ref RUNTIME_SENSITIVE_KEYS: RwLock<Vec<String>> = RwLock::new(Vec::new());
}

/// Registers an additional sensitive key (lower-cased) for future sanitization.
pub fn add_sensitive_key(key: &str) {
    RUNTIME_SENSITIVE_KEYS.write().push(key.to_lowercase());
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    if DEFAULT_SENSITIVE_KEYS.contains(&lower.as_str()) {
        return true;
    }
    RUNTIME_SENSITIVE_KEYS.read().iter().any(|k| k == &lower)
}

/// Redacts sensitive values and enforces a total size cap, returning a new map.
pub fn sanitize_context(context: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    if context.is_empty() {
        return BTreeMap::new();
    }

    let mut sanitized = BTreeMap::new();
    for (key, value) in context {
        if is_sensitive(key) {
            sanitized.insert(key.clone(), json!(REDACTED_PLACEHOLDER));
        } else {
            sanitized.insert(key.clone(), value.clone());
        }
    }

    let size_estimate = serde_json::to_string(&sanitized).map(|s| s.len()).unwrap_or(0);
    if size_estimate > MAX_CONTEXT_SIZE_BYTES {
        let mut truncated = BTreeMap::new();
        truncated.insert("_truncated".to_string(), json!(true));
        truncated.insert(
            "_original_keys".to_string(),
            json!(context.keys().cloned().collect::<Vec<_>>()),
        );
        truncated.insert("_size_bytes".to_string(), json!(size_estimate));
        return truncated;
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_known_keys_case_insensitively() {
        let mut ctx = BTreeMap::new();
        ctx.insert("Password".to_string(), json!("s3cret"));
        ctx.insert("host".to_string(), json!("10.0.0.1"));

        let sanitized = sanitize_context(&ctx);
        assert_eq!(sanitized["Password"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(sanitized["host"], json!("10.0.0.1"));
    }

    #[test]
    fn does_not_mutate_input() {
        let mut ctx = BTreeMap::new();
        ctx.insert("token".to_string(), json!("abc"));
        let _ = sanitize_context(&ctx);
        assert_eq!(ctx["token"], json!("abc"));
    }

    #[test]
    fn runtime_key_is_redacted_after_registration() {
        add_sensitive_key("my_custom_secret");
        let mut ctx = BTreeMap::new();
        ctx.insert("my_custom_secret".to_string(), json!("x"));
        let sanitized = sanitize_context(&ctx);
        assert_eq!(sanitized["my_custom_secret"], json!(REDACTED_PLACEHOLDER));
    }

    #[test]
    fn oversized_context_is_truncated_to_metadata() {
        let mut ctx = BTreeMap::new();
        ctx.insert("blob".to_string(), json!("x".repeat(2000)));
        let sanitized = sanitize_context(&ctx);
        assert_eq!(sanitized["_truncated"], json!(true));
        assert!(sanitized.contains_key("_original_keys"));
        assert!(sanitized.contains_key("_size_bytes"));
    }
}
