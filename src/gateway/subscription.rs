//! Subscription registry: wildcard expansion, idempotent add/remove, limit
//! enforcement, and batching for the native SDK's per-call cap.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use super::error::{GatewayError, GatewayErrorKind};

/// The native SDK's per-call subscribe/unsubscribe cap.
pub const SUBSCRIBE_BATCH_SIZE: usize = 100;

/// `*` matches any run of characters (including empty); `?` matches exactly
/// one character. No other metacharacters are recognized.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    matches(&pattern, &candidate)
}

fn matches(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            matches(&pattern[1..], text)
                || (!text.is_empty() && matches(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && matches(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && matches(&pattern[1..], &text[1..]),
    }
}

/// Tracks subscribed symbols against a known universe, used only for
/// wildcard expansion.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    universe: BTreeSet<String>,
    subscribed: BTreeSet<String>,
    max_subscriptions: usize,
}

impl SubscriptionRegistry {
    pub fn new(universe: BTreeSet<String>, max_subscriptions: usize) -> Self {
        Self {
            universe,
            subscribed: BTreeSet::new(),
            max_subscriptions,
        }
    }

    pub fn subscribed(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    pub fn subscribed_count(&self) -> usize {
        self.subscribed.len()
    }

    /// Expands wildcard patterns against the symbol universe, deduplicated.
    /// Literal symbols (no `*`/`?`) pass through unchanged even if absent
    /// from the universe.
    pub fn expand(&self, patterns: &[String]) -> Vec<String> {
        let mut result = BTreeSet::new();
        for pattern in patterns {
            if pattern.contains('*') || pattern.contains('?') {
                let matched: Vec<&String> = self
                    .universe
                    .iter()
                    .filter(|s| glob_match(pattern, s))
                    .collect();
                if matched.is_empty() {
                    tracing::warn!(pattern = %pattern, "wildcard_matched_nothing");
                } else {
                    result.extend(matched.into_iter().cloned());
                }
            } else {
                result.insert(pattern.clone());
            }
        }
        result.into_iter().collect()
    }

    /// Validates a subscribe request against the limit and idempotence
    /// rules, without mutating state. Returns the deduplicated new symbols
    /// that would actually need an SDK call.
    pub fn plan_subscribe(&self, patterns: &[String]) -> Result<Vec<String>, GatewayError> {
        let expanded = self.expand(patterns);
        let new_symbols: Vec<String> = expanded
            .into_iter()
            .filter(|s| !self.subscribed.contains(s))
            .collect();

        if new_symbols.is_empty() {
            return Ok(new_symbols);
        }

        let total = self.subscribed.len() + new_symbols.len();
        if total > self.max_subscriptions {
            let mut ctx = BTreeMap::new();
            ctx.insert("current".to_string(), json!(self.subscribed.len()));
            ctx.insert("max".to_string(), json!(self.max_subscriptions));
            ctx.insert("requested".to_string(), json!(new_symbols.len()));
            ctx.insert("symbols".to_string(), json!(new_symbols));
            return Err(GatewayError::new(
                format!("subscription limit exceeded: {} > {}", total, self.max_subscriptions),
                GatewayErrorKind::SubscriptionLimitExceeded,
            )
            .with_context(ctx));
        }

        Ok(new_symbols)
    }

    /// Splits a symbol list into batches of at most [`SUBSCRIBE_BATCH_SIZE`].
    pub fn batches(symbols: &[String]) -> impl Iterator<Item = &[String]> {
        symbols.chunks(SUBSCRIBE_BATCH_SIZE)
    }

    /// Records a successful subscribe for one symbol.
    pub fn mark_subscribed(&mut self, symbol: &str) {
        self.subscribed.insert(symbol.to_string());
    }

    /// Drops symbols the caller has intersected against the subscribed set.
    pub fn mark_unsubscribed(&mut self, symbols: &[String]) {
        for s in symbols {
            self.subscribed.remove(s);
        }
    }

    /// Intersects the requested symbols with the currently subscribed set.
    pub fn intersect_subscribed<'a>(&self, symbols: &'a [String]) -> Vec<&'a String> {
        symbols.iter().filter(|s| self.subscribed.contains(*s)).collect()
    }

    /// Snapshots and clears the subscribed set, for the reconnect restore
    /// path (`subscribe(snapshot)` is then driven by the caller).
    pub fn take_snapshot(&mut self) -> Vec<String> {
        let snapshot: Vec<String> = self.subscribed.iter().cloned().collect();
        self.subscribed.clear();
        snapshot
    }
}
