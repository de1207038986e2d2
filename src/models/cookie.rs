use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Session cookies minted by the browser, plus their validity window.
///
/// A set is never edited after construction; a refresh builds a new one.
/// The serialized form is the on-disk cache layout:
/// `{"cookies": {..}, "acquired_at": "<ISO-8601>", "expires_at": <epoch secs>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSet {
    cookies: BTreeMap<String, String>,
    acquired_at: DateTime<Utc>,
    expires_at: i64,
}

impl CookieSet {
    pub fn new(cookies: BTreeMap<String, String>, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        // An unrepresentable TTL means the set never expires
        let expires_at = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| acquired_at.timestamp().checked_add(secs))
            .unwrap_or(i64::MAX);
        Self {
            cookies,
            acquired_at,
            expires_at,
        }
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Expiry as epoch seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Required names that this set does not carry, in the order given.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.cookies.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Value for a `Cookie:` request header.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
