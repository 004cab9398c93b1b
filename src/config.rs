//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::story::manifest::LocaleFallback;

/// Default CDN hosting the onboarding manifest and images.
pub const DEFAULT_CDN_URL: &str = "https://updates.signal.org";

/// Onboarding story configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// Local database file holding settings, conversations and messages.
    pub db_path: PathBuf,
    /// Base URL of the story CDN. `None` leaves the transport unattached.
    pub cdn_url: Option<String>,
    /// Account record endpoint. `None` means the local flag is authoritative.
    pub account_url: Option<String>,
    /// Bearer token for the account record endpoint.
    pub account_token: Option<SecretString>,
    /// Directory processed attachments are written to.
    pub attachments_dir: PathBuf,
    /// What to do when neither the active locale nor `en` is in the manifest.
    pub locale_fallback: LocaleFallback,
    /// Upper bound on a single account sync round-trip.
    pub sync_timeout: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onboarding-story.db"),
            cdn_url: Some(DEFAULT_CDN_URL.to_string()),
            account_url: None,
            account_token: None,
            attachments_dir: PathBuf::from("./data/attachments"),
            locale_fallback: LocaleFallback::Strict,
            sync_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(20),
        }
    }
}

impl StoryConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("STORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        // An explicitly empty STORY_CDN_URL disables the transport.
        let cdn_url = match std::env::var("STORY_CDN_URL") {
            Ok(url) if url.trim().is_empty() => None,
            Ok(url) => Some(url.trim().trim_end_matches('/').to_string()),
            Err(_) => defaults.cdn_url,
        };

        let account_url = std::env::var("STORY_ACCOUNT_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let account_token = std::env::var("STORY_ACCOUNT_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let attachments_dir = std::env::var("STORY_ATTACHMENTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.attachments_dir);

        let locale_fallback = match std::env::var("STORY_LOCALE_FALLBACK") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.locale_fallback,
        };

        let sync_timeout = parse_secs("STORY_SYNC_TIMEOUT_SECS")?.unwrap_or(defaults.sync_timeout);
        let http_timeout = parse_secs("STORY_HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout);

        Ok(Self {
            db_path,
            cdn_url,
            account_url,
            account_token,
            attachments_dir,
            locale_fallback,
            sync_timeout,
            http_timeout,
        })
    }
}

fn parse_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_public_cdn() {
        let config = StoryConfig::default();
        assert_eq!(config.cdn_url.as_deref(), Some(DEFAULT_CDN_URL));
        assert!(config.account_url.is_none());
        assert_eq!(config.locale_fallback, LocaleFallback::Strict);
        assert_eq!(config.sync_timeout, Duration::from_secs(30));
    }

    #[test]
    fn from_env_reads_overrides() {
        // SAFETY: these keys are only touched by this test.
        unsafe {
            std::env::set_var("STORY_CDN_URL", "https://cdn.example.test/");
            std::env::set_var("STORY_LOCALE_FALLBACK", "any");
            std::env::set_var("STORY_SYNC_TIMEOUT_SECS", "5");
        }
        let config = StoryConfig::from_env().unwrap();
        unsafe {
            std::env::remove_var("STORY_CDN_URL");
            std::env::remove_var("STORY_LOCALE_FALLBACK");
            std::env::remove_var("STORY_SYNC_TIMEOUT_SECS");
        }

        assert_eq!(config.cdn_url.as_deref(), Some("https://cdn.example.test"));
        assert_eq!(config.locale_fallback, LocaleFallback::AnyAvailable);
        assert_eq!(config.sync_timeout, Duration::from_secs(5));
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        // SAFETY: this key is only touched by this test.
        unsafe { std::env::set_var("STORY_TEST_BOGUS_SECS", "soon") };
        let err = parse_secs("STORY_TEST_BOGUS_SECS").unwrap_err();
        unsafe { std::env::remove_var("STORY_TEST_BOGUS_SECS") };
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
