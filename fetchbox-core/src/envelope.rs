//! The `{code, data, msg}` envelope wrapped around every API response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Embedded status codes carried in [`ResponseEnvelope::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    /// The request failed at the application level; `msg` explains why.
    Error = 0,
    /// The request succeeded.
    Success = 200,
}

impl CodeStatus {
    /// Maps a raw embedded code to a known status.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CodeStatus::Error),
            200 => Some(CodeStatus::Success),
            _ => None,
        }
    }
}

/// API response body.
///
/// Older endpoints name the fields `errno` and `errmsg`; both spellings are
/// accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Embedded status or error code.
    #[serde(default, alias = "errno")]
    pub code: Option<i64>,
    /// Payload handed back to the caller.
    #[serde(default)]
    pub data: Value,
    /// Human readable message accompanying `code`.
    #[serde(default, alias = "errmsg")]
    pub msg: Option<String>,
}

impl ResponseEnvelope {
    /// Wraps a successful payload.
    pub fn success(data: Value) -> Self {
        Self {
            code: Some(CodeStatus::Success as i64),
            data,
            msg: None,
        }
    }

    /// Interprets a raw response body.
    ///
    /// Objects are read as envelopes. Anything else is not an envelope and is
    /// taken to be the payload itself. When a body carries both spellings of
    /// a field, `code` wins over `errno` and `msg` over `errmsg`.
    pub fn from_body(body: Value) -> Self {
        match body {
            Value::Object(ref map) => {
                let mut fields = map.clone();
                for (current, legacy) in [("code", "errno"), ("msg", "errmsg")] {
                    if fields.contains_key(current) {
                        fields.remove(legacy);
                    }
                }
                serde_json::from_value(Value::Object(fields)).unwrap_or(Self {
                    code: None,
                    data: body,
                    msg: None,
                })
            }
            other => Self {
                code: None,
                data: other,
                msg: None,
            },
        }
    }

    /// Returns the embedded code as a known status, if it is one.
    pub fn status(&self) -> Option<CodeStatus> {
        self.code.and_then(CodeStatus::from_code)
    }
}
