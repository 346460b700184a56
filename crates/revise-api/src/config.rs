use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const MIN_JWT_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub max_sync_batch: usize,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub profile_rate_limit_per_window: u32,
    pub ai_rate_limit_per_window: u32,
    pub gemini: GeminiConfig,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    /// AI endpoints answer with a configuration error while this is unset
    pub api_key: Option<String>,
    pub api_url: String,
    pub deck_model: String,
    pub distractor_model: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("deck_model", &self.deck_model)
            .field("distractor_model", &self.distractor_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("max_sync_batch", &self.max_sync_batch)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field(
                "profile_rate_limit_per_window",
                &self.profile_rate_limit_per_window,
            )
            .field("ai_rate_limit_per_window", &self.ai_rate_limit_per_window)
            .field("gemini", &self.gemini)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "REVISE_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "REVISE_DATABASE_PATH", "revise-api.db"));

        let jwt_secret = required_trimmed(&lookup, "IDENTITY_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "IDENTITY_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        let jwt_audience = optional_trimmed(&lookup, "IDENTITY_JWT_AUDIENCE");
        let jwt_issuer = optional_trimmed(&lookup, "IDENTITY_JWT_ISSUER");

        let auth_clock_skew_secs = parse_in_range(&lookup, "AUTH_CLOCK_SKEW_SECS", 60, 0..=300)?;
        let max_sync_batch = parse_in_range(&lookup, "SYNC_MAX_BATCH", 5_000, 1..=50_000)?;
        let rate_limit_window_secs =
            parse_in_range(&lookup, "RATE_LIMIT_WINDOW_SECS", 60, 10..=3_600)?;
        let sync_rate_limit_per_window =
            parse_in_range(&lookup, "SYNC_RATE_LIMIT_PER_WINDOW", 60, 1..=5_000)?;
        let profile_rate_limit_per_window =
            parse_in_range(&lookup, "PROFILE_RATE_LIMIT_PER_WINDOW", 120, 1..=5_000)?;
        let ai_rate_limit_per_window =
            parse_in_range(&lookup, "AI_RATE_LIMIT_PER_WINDOW", 10, 1..=1_000)?;

        let gemini = parse_gemini_config(&lookup)?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            max_sync_batch,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window,
            profile_rate_limit_per_window,
            ai_rate_limit_per_window,
            gemini,
        })
    }
}

fn parse_gemini_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<GeminiConfig, ConfigError> {
    let api_url = value_or_default(
        &lookup,
        "GEMINI_API_URL",
        "https://generativelanguage.googleapis.com/v1beta",
    );
    if !is_http_url(&api_url) {
        return Err(ConfigError::Invalid(
            "GEMINI_API_URL must start with http:// or https://".to_string(),
        ));
    }
    let timeout_secs = parse_in_range(&lookup, "GEMINI_TIMEOUT_SECS", 60, 5..=300)?;

    Ok(GeminiConfig {
        api_key: optional_trimmed(&lookup, "GEMINI_API_KEY"),
        api_url: trim_trailing(&api_url).to_string(),
        deck_model: value_or_default(&lookup, "GEMINI_DECK_MODEL", "gemini-2.5-flash"),
        distractor_model: value_or_default(
            &lookup,
            "GEMINI_DISTRACTOR_MODEL",
            "gemini-2.5-flash-lite",
        ),
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
{
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?,
        None => default,
    };
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}

#[cfg(test)]
pub(crate) fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert(
        "IDENTITY_JWT_SECRET".to_string(),
        "test-secret-with-enough-bytes".to_string(),
    );
    for (key, value) in extra {
        map.insert((*key).to_string(), (*value).to_string());
    }
    AppConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
}
