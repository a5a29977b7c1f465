use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "MEAR";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry backend used when `MEAR_API_BASE_URL` is unset.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:4000";

/// Timeout applied to every backend request.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

// ---------------------------------------------------------------------------
// Timing policy
// ---------------------------------------------------------------------------

/// Quiescence required before a mutation-triggered save is sent.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Absolute fallback save period while the form has unsaved changes.
pub const FALLBACK_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Display duration of a non-critical alert before it is auto-dismissed.
pub const ALERT_AUTO_DISMISS: Duration = Duration::from_secs(3);

/// Non-critical alerts older than this are dropped by `clear_stale_alerts`.
pub const STALE_ALERT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Prefix of the local mirror file names.
pub const LOCAL_DRAFT_PREFIX: &str = "mear-form-draft";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "mear=info,mear_lib=info,warn"
}

/// Get the application data directory.
/// ~/MEAR/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
}

/// Get the local draft mirror directory
pub fn drafts_dir() -> PathBuf {
    app_data_dir().join("drafts")
}

/// Get the report export directory
pub fn exports_dir() -> PathBuf {
    app_data_dir().join("exports")
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Settings resolved from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub drafts_dir: PathBuf,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Reads `MEAR_API_BASE_URL`, `MEAR_API_TOKEN`, `MEAR_DATA_DIR` and
    /// `MEAR_HTTP_TIMEOUT_SECS`. Missing or malformed values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = lookup("MEAR_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let api_token = lookup("MEAR_API_TOKEN").filter(|v| !v.trim().is_empty());

        let drafts_dir = lookup("MEAR_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(|dir| PathBuf::from(dir).join("drafts"))
            .unwrap_or_else(drafts_dir);

        let http_timeout_secs = match lookup("MEAR_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid MEAR_HTTP_TIMEOUT_SECS, using default");
                DEFAULT_HTTP_TIMEOUT_SECS
            }),
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Self {
            api_base_url,
            api_token,
            drafts_dir,
            http_timeout_secs,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
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
    fn drafts_dir_under_app_data() {
        let drafts = drafts_dir();
        assert!(drafts.starts_with(app_data_dir()));
        assert!(drafts.ends_with("drafts"));
    }

    #[test]
    fn app_name_is_mear() {
        assert_eq!(APP_NAME, "MEAR");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:4000");
        assert_eq!(config.api_token, None);
        assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
        assert_eq!(config.drafts_dir, drafts_dir());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MEAR_API_BASE_URL", "https://registry.example.org"),
            ("MEAR_API_TOKEN", "abc123"),
            ("MEAR_DATA_DIR", "/tmp/mear-data"),
            ("MEAR_HTTP_TIMEOUT_SECS", "42"),
        ]));
        assert_eq!(config.api_base_url, "https://registry.example.org");
        assert_eq!(config.api_token.as_deref(), Some("abc123"));
        assert_eq!(config.drafts_dir, PathBuf::from("/tmp/mear-data/drafts"));
        assert_eq!(config.http_timeout_secs, 42);
    }

    #[test]
    fn blank_and_malformed_values_fall_back() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MEAR_API_BASE_URL", "  "),
            ("MEAR_API_TOKEN", ""),
            ("MEAR_HTTP_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.api_token, None);
        assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn debounce_is_shorter_than_fallback_save() {
        assert!(SAVE_DEBOUNCE < FALLBACK_SAVE_INTERVAL);
        assert!(ALERT_AUTO_DISMISS < STALE_ALERT_WINDOW);
    }
}
