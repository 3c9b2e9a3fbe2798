//! Cache key derivation.
//!
//! A [`CacheKey`] identifies a logical request: the URL plus its serialized
//! query or body parameters. The same key is used to coalesce cached requests
//! and to detect duplicate in-flight requests.
//!
//! Parameters are rendered as a bracketed query string, the way most web
//! backends expect nested params:
//!
//! ```
//! use fetchbox_core::CacheKey;
//! use serde_json::json;
//!
//! let key = CacheKey::from_request("/users", Some(&json!({"id": 1, "filter": {"role": "admin"}})));
//! assert_eq!(key.as_str(), "/users?filter%5Brole%5D=admin&id=1");
//!
//! // No params, or an empty object, yields the bare URL.
//! assert_eq!(CacheKey::from_request("/users", None).as_str(), "/users");
//! assert_eq!(CacheKey::from_request("/users", Some(&json!({}))).as_str(), "/users");
//! ```
//!
//! Object keys are sorted before rendering, so two param objects with the same
//! entries always produce the same key no matter how they were built.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Key identifying a logical request.
///
/// Cloning is cheap: short keys are stored inline and long keys are
/// reference counted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Wraps an already rendered key.
    pub fn new(key: impl Into<SmolStr>) -> Self {
        Self(key.into())
    }

    /// Derives the key for `url` with optional query or body params.
    pub fn from_request(url: &str, params: Option<&Value>) -> Self {
        match params.and_then(query_string) {
            Some(query) => Self(SmolStr::from(format!("{url}?{query}"))),
            None => Self(SmolStr::new(url)),
        }
    }

    /// Returns the rendered key.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Renders `params` as a bracketed, percent-encoded query string with sorted
/// keys. Returns `None` when there is nothing to render.
pub fn query_string(params: &Value) -> Option<String> {
    let pairs = query_pairs(params);
    if pairs.is_empty() {
        return None;
    }
    serde_urlencoded::to_string(&pairs).ok()
}

fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    match params {
        Value::Object(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in entries {
                flatten(name.clone(), value, &mut pairs);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten(index.to_string(), value, &mut pairs);
            }
        }
        // A bare scalar has no named fields to render.
        _ => {}
    }
    pairs
}

fn flatten(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (name, nested) in entries {
                flatten(format!("{prefix}[{name}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(format!("{prefix}[{index}]"), nested, pairs);
            }
        }
        Value::Null => pairs.push((prefix, String::new())),
        Value::String(text) => pairs.push((prefix, text.clone())),
        other => pairs.push((prefix, other.to_string())),
    }
}
