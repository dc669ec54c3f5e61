//! Configuration types for input-vfs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable overriding [`PathsConfig::inputs_dir`]
pub const INPUTS_DIR_ENV: &str = "VH_INPUTS_DIR";
/// Environment variable overriding [`PathsConfig::config_dir`]
pub const CONFIG_DIR_ENV: &str = "VH_CONFIG_DIR";
/// Environment variable overriding [`ApiConfig::base_url`]
pub const API_BASE_URL_ENV: &str = "VH_API_BASE_URL";

/// File name of the persisted input declarations inside the config directory
pub const INPUTS_CONFIG_FILE: &str = "inputs.json";

/// Filesystem locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-input download directories (default: "/valohai/inputs")
    #[serde(default = "default_inputs_dir")]
    pub inputs_dir: PathBuf,

    /// Directory holding the persisted job configuration (default: "/valohai/config")
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inputs_dir: default_inputs_dir(),
            config_dir: default_config_dir(),
        }
    }
}

impl PathsConfig {
    /// Path of the persisted input declarations
    pub fn inputs_config_path(&self) -> PathBuf {
        self.config_dir.join(INPUTS_CONFIG_FILE)
    }

    /// Deterministic download directory of one input
    pub fn input_dir(&self, input_name: &str) -> PathBuf {
        self.inputs_dir.join(input_name)
    }
}

/// Download behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent fetches within one input (default: 4)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Timeout for a single HTTP request (default: 300 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Keep going when a file fails to download (default: false)
    ///
    /// When false, the first failed file aborts the download pass. When true,
    /// failures are collected in the download report and logged.
    #[serde(default)]
    pub allow_partial: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            timeout: default_timeout(),
            allow_partial: false,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Platform API used for datum resolution and batch download URLs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the platform API (default: "https://app.valohai.com")
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
        }
    }
}

/// VFS assembly options that are not per-call
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Name archive members `<archive name>/<member path>` instead of `<member path>`
    #[serde(default)]
    pub prefix_archive_members: bool,
}

/// Main configuration for input resolution
///
/// Every section has working defaults, so `Config::default()` is usable as-is
/// inside a job container. [`Config::from_env`] overlays the well-known
/// environment variables on top of the defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Download behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry behavior of the HTTP collaborators
    #[serde(default)]
    pub retry: RetryConfig,

    /// Platform API
    #[serde(default)]
    pub api: ApiConfig,

    /// VFS assembly
    #[serde(default)]
    pub vfs: VfsConfig,
}

impl Config {
    /// Defaults overlaid with `VH_INPUTS_DIR`, `VH_CONFIG_DIR` and `VH_API_BASE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = non_empty_env(INPUTS_DIR_ENV) {
            config.paths.inputs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env(CONFIG_DIR_ENV) {
            config.paths.config_dir = PathBuf::from(dir);
        }
        if let Some(url) = non_empty_env(API_BASE_URL_ENV) {
            config.api.base_url = url;
        }
        config
    }

    /// Check settings that would otherwise fail late
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("download.max_concurrent_fetches".to_string()),
            });
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid API base URL: {}", self.api.base_url),
                key: Some("api.base_url".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn default_inputs_dir() -> PathBuf {
    PathBuf::from("/valohai/inputs")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/valohai/config")
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_api_base_url() -> String {
    "https://app.valohai.com".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.paths.inputs_dir, PathBuf::from("/valohai/inputs"));
        assert_eq!(config.paths.config_dir, PathBuf::from("/valohai/config"));
        assert_eq!(config.download.max_concurrent_fetches, 4);
        assert!(!config.download.allow_partial);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.vfs.prefix_archive_members);
    }

    #[test]
    fn inputs_config_path_is_inside_config_dir() {
        let paths = PathsConfig {
            inputs_dir: PathBuf::from("/in"),
            config_dir: PathBuf::from("/cfg"),
        };
        assert_eq!(paths.inputs_config_path(), PathBuf::from("/cfg/inputs.json"));
        assert_eq!(paths.input_dir("train"), PathBuf::from("/in/train"));
    }

    #[test]
    fn durations_are_whole_seconds() {
        let json = r#"{"download": {"timeout": 12}, "retry": {"initial_delay": 2, "max_delay": 9}}"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");
        assert_eq!(config.download.timeout, Duration::from_secs(12));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
        assert_eq!(config.retry.max_delay, Duration::from_secs(9));

        let back = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(back["download"]["timeout"], 12);
    }

    #[test]
    fn duration_serde_rejects_negative_integer() {
        let json = r#"{"timeout": -1}"#;
        let result = serde_json::from_str::<DownloadConfig>(json);
        assert!(
            result.is_err(),
            "-1 for a Duration (u64) field must produce a serde error"
        );
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent_fetches = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("download.max_concurrent_fetches"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_unparseable_api_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    #[serial]
    fn from_env_overlays_environment() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var(INPUTS_DIR_ENV, "/tmp/job/inputs");
            std::env::set_var(CONFIG_DIR_ENV, "/tmp/job/config");
            std::env::remove_var(API_BASE_URL_ENV);
        }

        let config = Config::from_env();
        assert_eq!(config.paths.inputs_dir, PathBuf::from("/tmp/job/inputs"));
        assert_eq!(config.paths.config_dir, PathBuf::from("/tmp/job/config"));
        assert_eq!(config.api.base_url, "https://app.valohai.com");

        unsafe {
            std::env::remove_var(INPUTS_DIR_ENV);
            std::env::remove_var(CONFIG_DIR_ENV);
        }
    }

    #[test]
    #[serial]
    fn from_env_ignores_empty_values() {
        unsafe {
            std::env::set_var(INPUTS_DIR_ENV, "");
        }
        let config = Config::from_env();
        assert_eq!(config.paths.inputs_dir, PathBuf::from("/valohai/inputs"));
        unsafe {
            std::env::remove_var(INPUTS_DIR_ENV);
        }
    }
}
