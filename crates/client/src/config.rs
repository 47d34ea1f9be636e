use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use url::Url;

use pubtrack_auth::{GuardConfig, default_recovery_window};
use pubtrack_observability::LogConfig;
use pubtrack_publications::DEFAULT_DOCUMENT_BUCKET;

pub const DEFAULT_ROLE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub anon_key: String,
    /// Public origin of the application; password-reset links point here.
    pub site_url: Url,
    pub sign_in_path: String,
    pub landing_path: String,
    pub recovery_window: chrono::Duration,
    pub role_lookup_timeout: Duration,
    pub document_bucket: String,
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let guard = GuardConfig::default();
        Self {
            backend_url: Url::parse("http://localhost:54321/").expect("valid literal URL"),
            anon_key: String::new(),
            site_url: Url::parse("http://localhost:3000/").expect("valid literal URL"),
            sign_in_path: guard.sign_in_path,
            landing_path: guard.landing_path,
            recovery_window: default_recovery_window(),
            role_lookup_timeout: DEFAULT_ROLE_LOOKUP_TIMEOUT,
            document_bucket: DEFAULT_DOCUMENT_BUCKET.to_string(),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. Unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let backend_url = match get("PUBTRACK_BACKEND_URL") {
            Some(raw) => Url::parse(&raw).context("PUBTRACK_BACKEND_URL must be a valid URL")?,
            None => defaults.backend_url,
        };
        let site_url = match get("PUBTRACK_SITE_URL") {
            Some(raw) => Url::parse(&raw).context("PUBTRACK_SITE_URL must be a valid URL")?,
            None => defaults.site_url,
        };
        let recovery_window = match get("PUBTRACK_RECOVERY_WINDOW_SECS") {
            Some(raw) => chrono::Duration::seconds(
                raw.parse()
                    .context("PUBTRACK_RECOVERY_WINDOW_SECS must be a number of seconds")?,
            ),
            None => defaults.recovery_window,
        };
        let role_lookup_timeout = match get("PUBTRACK_ROLE_LOOKUP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .context("PUBTRACK_ROLE_LOOKUP_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => defaults.role_lookup_timeout,
        };
        let json = match get("PUBTRACK_LOG_JSON") {
            Some(raw) => parse_flag(&raw).context("PUBTRACK_LOG_JSON must be true or false")?,
            None => defaults.log.json,
        };

        let config = Self {
            backend_url,
            anon_key: get("PUBTRACK_ANON_KEY").unwrap_or(defaults.anon_key),
            site_url,
            sign_in_path: get("PUBTRACK_SIGN_IN_PATH").unwrap_or(defaults.sign_in_path),
            landing_path: get("PUBTRACK_LANDING_PATH").unwrap_or(defaults.landing_path),
            recovery_window,
            role_lookup_timeout,
            document_bucket: get("PUBTRACK_DOCUMENT_BUCKET").unwrap_or(defaults.document_bucket),
            log: LogConfig {
                json,
                ..defaults.log
            },
        };

        anyhow::ensure!(
            config.sign_in_path.starts_with('/') && config.landing_path.starts_with('/'),
            "PUBTRACK_SIGN_IN_PATH and PUBTRACK_LANDING_PATH must be absolute paths"
        );
        Ok(config)
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            sign_in_path: self.sign_in_path.clone(),
            landing_path: self.landing_path.clone(),
            recovery_window: self.recovery_window,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
