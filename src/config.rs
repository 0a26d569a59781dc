use std::fmt;
use std::time::Duration;

use crate::pipeline::structuring::ExtractionError;

/// Application-level constants
pub const APP_NAME: &str = "harvest-extract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Gemini `generateContent` endpoint used when `GEMINI_API_URL` is unset.
pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";

/// Free tier allows 5 requests per minute (one per 12s); 3s safety margin on top.
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 15;

/// Attempts per logical request, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Free-tier daily request ceiling reported in `quotaValue` when the per-day quota trips.
pub const DEFAULT_DAILY_QUOTA_CEILING: u32 = 20;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_URL: &str = "GEMINI_API_URL";
pub const ENV_MIN_INTERVAL_SECS: &str = "EXTRACT_MIN_INTERVAL_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "EXTRACT_MAX_ATTEMPTS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "EXTRACT_HTTP_TIMEOUT_SECS";
pub const ENV_DAILY_QUOTA_CEILING: &str = "EXTRACT_DAILY_QUOTA_CEILING";

/// Default `tracing` filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "harvest_extract=info,warn"
}

/// Runtime configuration for the extraction pipeline.
#[derive(Clone)]
pub struct ExtractorConfig {
    pub api_key: String,
    pub api_url: String,
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub http_timeout: Duration,
    pub daily_quota_ceiling: u32,
}

impl ExtractorConfig {
    /// Config with documented defaults. A missing or blank key is a
    /// configuration error, surfaced before any request is attempted.
    pub fn new(api_key: Option<String>) -> Result<Self, ExtractionError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ExtractionError::Configuration(format!("{ENV_API_KEY} is not set"))
            })?;

        Ok(Self {
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            min_interval: Duration::from_secs(DEFAULT_MIN_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            daily_quota_ceiling: DEFAULT_DAILY_QUOTA_CEILING,
        })
    }

    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ExtractionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(lookup(ENV_API_KEY))?;

        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }
        if let Some(secs) = parse_number::<u64>(&lookup, ENV_MIN_INTERVAL_SECS)? {
            config.min_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_number::<u32>(&lookup, ENV_MAX_ATTEMPTS)? {
            config.max_attempts = attempts;
        }
        if let Some(secs) = parse_number::<u64>(&lookup, ENV_HTTP_TIMEOUT_SECS)? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(ceiling) = parse_number::<u32>(&lookup, ENV_DAILY_QUOTA_CEILING)? {
            config.daily_quota_ceiling = ceiling;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.max_attempts == 0 {
            return Err(ExtractionError::Configuration(format!(
                "{ENV_MAX_ATTEMPTS} must be at least 1"
            )));
        }
        if self.http_timeout.is_zero() {
            return Err(ExtractionError::Configuration(format!(
                "{ENV_HTTP_TIMEOUT_SECS} must be greater than 0"
            )));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ExtractionError::Configuration(format!(
                "{ENV_API_URL} must be an http(s) URL, got {}",
                self.api_url
            )));
        }
        Ok(())
    }
}

// The API key never reaches logs.
impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("min_interval", &self.min_interval)
            .field("max_attempts", &self.max_attempts)
            .field("http_timeout", &self.http_timeout)
            .field("daily_quota_ceiling", &self.daily_quota_ceiling)
            .finish()
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ExtractionError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ExtractionError::Configuration(format!("{key} must be a whole number, got {raw:?}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_configuration_error() {
        let result = ExtractorConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ExtractionError::Configuration(_))));
    }

    #[test]
    fn blank_api_key_is_configuration_error() {
        let result = ExtractorConfig::from_lookup(lookup_from(&[(ENV_API_KEY, "   ")]));
        assert!(matches!(result, Err(ExtractionError::Configuration(_))));
    }

    #[test]
    fn defaults_applied_when_only_key_set() {
        let config = ExtractorConfig::from_lookup(lookup_from(&[(ENV_API_KEY, "k")])).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.min_interval, Duration::from_secs(15));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.daily_quota_ceiling, 20);
    }

    #[test]
    fn overrides_read_from_lookup() {
        let config = ExtractorConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_API_URL, "http://localhost:9000/generate"),
            (ENV_MIN_INTERVAL_SECS, "20"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_HTTP_TIMEOUT_SECS, "10"),
            (ENV_DAILY_QUOTA_CEILING, "50"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "http://localhost:9000/generate");
        assert_eq!(config.min_interval, Duration::from_secs(20));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.daily_quota_ceiling, 50);
    }

    #[test]
    fn non_numeric_interval_rejected() {
        let result = ExtractorConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_MIN_INTERVAL_SECS, "fifteen"),
        ]));
        assert!(matches!(result, Err(ExtractionError::Configuration(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let result = ExtractorConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_MAX_ATTEMPTS, "0"),
        ]));
        assert!(matches!(result, Err(ExtractionError::Configuration(_))));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = ExtractorConfig::new(Some("super-secret".into())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn app_name_is_harvest_extract() {
        assert_eq!(APP_NAME, "harvest-extract");
    }
}
