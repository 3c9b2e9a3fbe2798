use std::collections::BTreeMap;
use std::time::Duration;

use bounded_integer::bounded_integer;
use fetchbox_backend::DEFAULT_OBJECT_TTL;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

bounded_integer! {
    /// Maximum number of tasks a [`ConcurrentExecutor`](crate::ConcurrentExecutor)
    /// runs at once (1-255).
    #[repr(u8)]
    pub struct ConcurrencyLimit { 1..=255 }
}

impl ConcurrencyLimit {
    /// Five tasks at a time.
    pub fn standard() -> Self {
        Self::new(5).unwrap_or(Self::MIN)
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::standard()
    }
}

/// Delay between retries unless a request sets its own.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Errors raised while loading or applying a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    /// A default header name or value is not valid HTTP.
    #[error("invalid default header `{name}`")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The auth token cannot be used in a header value.
    #[error("auth token is not a valid header value")]
    InvalidToken,
}

/// Client-wide settings.
///
/// Every field has a default, so a YAML document only needs the keys it
/// changes:
///
/// ```
/// use fetchbox::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::from_yaml(r#"
/// base_url: https://api.example.com
/// retry_delay: 250ms
/// default_headers:
///   x-client: dashboard
/// "#)?;
///
/// assert_eq!(config.retry_delay, Duration::from_millis(250));
/// assert_eq!(config.object_store_ttl, Duration::from_secs(24 * 60 * 60));
/// # Ok::<(), fetchbox::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for relative request URLs. Used by the transport.
    pub base_url: Option<String>,
    /// Headers added to every request that does not set them itself.
    pub default_headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Delay between retries (e.g. "1s", "250ms").
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Lifetime of records written to the object store.
    #[serde(with = "humantime_serde")]
    pub object_store_ttl: Duration,
    /// Default limit for executors created from this config.
    pub concurrency: ConcurrencyLimit,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: BTreeMap::new(),
            auth_token: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            object_store_ttl: DEFAULT_OBJECT_TTL,
            concurrency: ConcurrencyLimit::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_saphyr::from_str(yaml)?)
    }

    /// [`default_headers`](Self::default_headers) as a [`HeaderMap`].
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            let invalid = || ConfigError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// The `Authorization` header value built from [`auth_token`](Self::auth_token).
    pub fn authorization(&self) -> Result<Option<HeaderValue>, ConfigError> {
        self.auth_token
            .as_deref()
            .map(|token| {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ConfigError::InvalidToken)?;
                value.set_sensitive(true);
                Ok(value)
            })
            .transpose()
    }
}
