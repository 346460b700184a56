//! Client configuration shared by every Revise front end.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const MIN_SYNC_INTERVAL_SECS: u64 = 5;

/// Where the Revise API lives and how often to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Periodic sync; `None` syncs only on login, network restore, or demand
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            sync_interval_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
        .validated()
    }

    /// Normalize the base URL and check the durations.
    pub fn validated(mut self) -> Result<Self> {
        let base = normalize_text_option(Some(self.api_base_url))
            .ok_or_else(|| Error::InvalidInput("api_base_url must not be empty".to_string()))?;
        if !is_http_url(&base) {
            return Err(Error::InvalidInput(format!(
                "api_base_url must include http:// or https://: {}",
                compact_text(&base)
            )));
        }
        self.api_base_url = base.trim_end_matches('/').to_string();

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(interval) = self.sync_interval_secs {
            if interval < MIN_SYNC_INTERVAL_SECS {
                return Err(Error::InvalidInput(format!(
                    "sync_interval_secs must be at least {MIN_SYNC_INTERVAL_SECS}"
                )));
            }
        }
        Ok(self)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs.map(Duration::from_secs)
    }

    /// Absolute URL of an API path such as `/v1/sync`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
