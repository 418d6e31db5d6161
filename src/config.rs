use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "AUTOMATION_INSPECTOR_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    /// File the configuration was read from; `None` when built-in defaults are used
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct InspectorConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Platform API access
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform API (the Supervisor proxy by default)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Upper bound on per-automation work running at once
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

/// Refresh cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Background rebuild interval (the cache TTL)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

/// Health annotation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_stale_threshold_days")]
    pub stale_threshold_days: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_threshold_days: default_stale_threshold_days(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://supervisor/core".to_string()
}

fn default_token_env() -> String {
    "SUPERVISOR_TOKEN".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_stale_threshold_days() -> i64 {
    30
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    1234
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in AUTOMATION_INSPECTOR_CONFIG environment variable
    /// 2. ./config.toml in current directory
    ///
    /// Without either, built-in defaults are used.
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let path = match std::env::var(CONFIG_ENV) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let mut config = Self::from_file(&path)?;
                config.source = Some(path);
                config
            }
            None => Config::default(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file without validating it
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.cache.refresh_interval_secs == 0 {
            anyhow::bail!("cache.refresh_interval_secs must be greater than 0");
        }

        if self.platform.max_concurrent_fetches == 0 {
            anyhow::bail!("platform.max_concurrent_fetches must be greater than 0");
        }

        if self.health.stale_threshold_days < 0 {
            anyhow::bail!("health.stale_threshold_days must not be negative");
        }

        let url = url::Url::parse(&self.platform.base_url)
            .with_context(|| format!("platform.base_url is not a valid URL: {}", self.platform.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "platform.base_url must use http or https, got {}",
                url.scheme()
            );
        }

        Ok(())
    }

    /// Read the platform bearer token from the configured environment variable
    pub fn platform_token(&self) -> Result<String> {
        std::env::var(&self.platform.token_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with the platform API token.",
                self.platform.token_env
            )
        })
    }

    /// Background refresh interval
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache.refresh_interval_secs)
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_server.host, self.http_server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_CONFIG: &str = r#"
[inspector]
log_level = "debug"

[platform]
base_url = "http://localhost:8123"
token_env = "INSPECTOR_TEST_TOKEN"
max_concurrent_fetches = 4

[cache]
refresh_interval_secs = 60

[health]
stale_threshold_days = 14

[http_server]
port = 9000
"#;

    fn with_config_env(config_path: &Path, f: impl FnOnce()) {
        let original = std::env::var(CONFIG_ENV).ok();
        std::env::set_var(CONFIG_ENV, config_path);
        f();
        std::env::remove_var(CONFIG_ENV);
        if let Some(val) = original {
            std::env::set_var(CONFIG_ENV, val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();

        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.inspector.log_level, "debug");
            assert_eq!(config.platform.base_url, "http://localhost:8123");
            assert_eq!(config.platform.max_concurrent_fetches, 4);
            assert_eq!(config.refresh_interval(), Duration::from_secs(60));
            assert_eq!(config.health.stale_threshold_days, 14);
            assert_eq!(config.bind_addr(), "0.0.0.0:9000");
            assert_eq!(config.source.as_deref(), Some(config_path.as_path()));
        });
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.platform.base_url, "http://supervisor/core");
        assert_eq!(config.platform.token_env, "SUPERVISOR_TOKEN");
        assert_eq!(config.cache.refresh_interval_secs, 300);
        assert_eq!(config.health.stale_threshold_days, 30);
        assert_eq!(config.http_server.port, 1234);
        assert!(config.source.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[health]\nstale_threshold_days = 7\n").unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.health.stale_threshold_days, 7);
        assert_eq!(config.cache.refresh_interval_secs, 300);
        assert_eq!(config.platform.token_env, "SUPERVISOR_TOKEN");
        assert!(config.source.is_none());
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Path::new("nonexistent.toml"), || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("nonexistent.toml"));
        });
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let mut config = Config::default();
        config.cache.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        let mut config = Config::default();
        config.platform.base_url = "supervisor/core".to_string();
        assert!(config.validate().is_err());

        config.platform.base_url = "ftp://supervisor/core".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_platform_token_missing_names_variable() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let mut config = Config::default();
        config.platform.token_env = "INSPECTOR_TOKEN_THAT_IS_NOT_SET".to_string();
        std::env::remove_var("INSPECTOR_TOKEN_THAT_IS_NOT_SET");
        let err = config.platform_token().unwrap_err();
        assert!(err.to_string().contains("INSPECTOR_TOKEN_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_platform_token_present() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let mut config = Config::default();
        config.platform.token_env = "INSPECTOR_TEST_TOKEN_PRESENT".to_string();
        std::env::set_var("INSPECTOR_TEST_TOKEN_PRESENT", "abc123");
        assert_eq!(config.platform_token().unwrap(), "abc123");
        std::env::remove_var("INSPECTOR_TEST_TOKEN_PRESENT");
    }
}
