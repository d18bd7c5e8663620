//! Structured error taxonomy for the gateway core.
//!
//! Closed set of numeric error codes, a redacted context map, and an
//! optional chained cause. Code ranges are wire-level stable: 1000 unknown,
//! 1010-1099 connection, 1100-1199 auth, 1200-1299 data, 1300-1399
//! subscription.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sanitize::sanitize_context;

/// Closed set of gateway error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    Unknown,
    ConnectionFailed,
    ConnectionTimeout,
    ConnectionLost,
    ReconnectExhausted,
    AuthFailed,
    AuthInvalidCredential,
    AuthExpired,
    AuthPermissionDenied,
    DataInvalid,
    DataValidationFailed,
    DataParseError,
    DataTimestampInvalid,
    SubscriptionFailed,
    SubscriptionLimitExceeded,
    SymbolNotFound,
    SymbolInvalidFormat,
}

impl GatewayErrorKind {
    /// Wire-stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Unknown => 1000,
            Self::ConnectionFailed => 1010,
            Self::ConnectionTimeout => 1011,
            Self::ConnectionLost => 1012,
            Self::ReconnectExhausted => 1013,
            Self::AuthFailed => 1100,
            Self::AuthInvalidCredential => 1101,
            Self::AuthExpired => 1102,
            Self::AuthPermissionDenied => 1103,
            Self::DataInvalid => 1200,
            Self::DataValidationFailed => 1201,
            Self::DataParseError => 1202,
            Self::DataTimestampInvalid => 1203,
            Self::SubscriptionFailed => 1300,
            Self::SubscriptionLimitExceeded => 1301,
            Self::SymbolNotFound => 1302,
            Self::SymbolInvalidFormat => 1303,
        }
    }

    /// SCREAMING_SNAKE_CASE name, used in `Display` and serialization.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::ReconnectExhausted => "RECONNECT_EXHAUSTED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::AuthInvalidCredential => "AUTH_INVALID_CREDENTIAL",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::AuthPermissionDenied => "AUTH_PERMISSION_DENIED",
            Self::DataInvalid => "DATA_INVALID",
            Self::DataValidationFailed => "DATA_VALIDATION_FAILED",
            Self::DataParseError => "DATA_PARSE_ERROR",
            Self::DataTimestampInvalid => "DATA_TIMESTAMP_INVALID",
            Self::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            Self::SubscriptionLimitExceeded => "SUBSCRIPTION_LIMIT_EXCEEDED",
            Self::SymbolNotFound => "SYMBOL_NOT_FOUND",
            Self::SymbolInvalidFormat => "SYMBOL_INVALID_FORMAT",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown error",
            Self::ConnectionFailed => "connection failed",
            Self::ConnectionTimeout => "connection timed out",
            Self::ConnectionLost => "connection lost",
            Self::ReconnectExhausted => "reconnect attempts exhausted",
            Self::AuthFailed => "authentication failed",
            Self::AuthInvalidCredential => "invalid credential",
            Self::AuthExpired => "credential expired",
            Self::AuthPermissionDenied => "permission denied",
            Self::DataInvalid => "invalid data",
            Self::DataValidationFailed => "data validation failed",
            Self::DataParseError => "data parse error",
            Self::DataTimestampInvalid => "timestamp invalid",
            Self::SubscriptionFailed => "subscription failed",
            Self::SubscriptionLimitExceeded => "subscription limit exceeded",
            Self::SymbolNotFound => "symbol not found",
            Self::SymbolInvalidFormat => "symbol format invalid",
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A gateway error: message, coded kind, redacted context, optional cause.
///
/// The context is sanitized once at construction and never mutated again,
/// matching the read-only contract callers depend on.
#[derive(Debug, Clone)]
pub struct GatewayError {
    message: String,
    kind: GatewayErrorKind,
    context: BTreeMap<String, Value>,
    cause: Option<Box<GatewayError>>,
}

impl GatewayError {
    pub fn new(message: impl Into<String>, kind: GatewayErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            context: BTreeMap::new(),
            cause: None,
        }
    }

    pub fn with_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.context = sanitize_context(&context);
        self
    }

    pub fn with_cause(mut self, cause: GatewayError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> GatewayErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Observably read-only context map.
    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn cause(&self) -> Option<&GatewayError> {
        self.cause.as_deref()
    }

    /// Serializes to the wire-stable structured map.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert(
            "exception_type".to_string(),
            Value::String("GatewayException".to_string()),
        );
        map.insert("message".to_string(), Value::String(self.message.clone()));
        map.insert(
            "error_code".to_string(),
            Value::Number(self.kind.code().into()),
        );
        map.insert(
            "error_name".to_string(),
            Value::String(self.kind.name().to_string()),
        );
        map.insert(
            "error_description".to_string(),
            Value::String(self.kind.description().to_string()),
        );
        map.insert(
            "context".to_string(),
            Value::Object(self.context.clone().into_iter().collect()),
        );
        map.insert(
            "cause".to_string(),
            self.cause
                .as_ref()
                .map(|c| Value::String(format!("{:?}", c)))
                .unwrap_or(Value::Null),
        );
        map
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_matches_bracketed_name() {
        let err = GatewayError::new("boom", GatewayErrorKind::ConnectionFailed);
        assert_eq!(err.to_string(), "[CONNECTION_FAILED] boom");
    }

    #[test]
    fn context_is_redacted_and_read_only() {
        let mut ctx = BTreeMap::new();
        ctx.insert("host".to_string(), json!("h"));
        ctx.insert("password".to_string(), json!("secret"));
        let err = GatewayError::new("auth", GatewayErrorKind::AuthFailed).with_context(ctx);

        assert_eq!(err.context().get("host").unwrap(), &json!("h"));
        assert_eq!(err.context().get("password").unwrap(), &json!("***REDACTED***"));
    }

    #[test]
    fn to_map_has_exact_shape() {
        let err = GatewayError::new("x", GatewayErrorKind::Unknown);
        let map = err.to_map();
        let mut keys: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "cause",
                "context",
                "error_code",
                "error_description",
                "error_name",
                "exception_type",
                "message",
            ]
        );
    }

    #[test]
    fn code_ranges_are_wire_stable() {
        assert_eq!(GatewayErrorKind::Unknown.code(), 1000);
        assert_eq!(GatewayErrorKind::ConnectionFailed.code(), 1010);
        assert_eq!(GatewayErrorKind::AuthFailed.code(), 1100);
        assert_eq!(GatewayErrorKind::DataInvalid.code(), 1200);
        assert_eq!(GatewayErrorKind::SubscriptionFailed.code(), 1300);
    }
}
