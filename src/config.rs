//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

/// Remote multipay API configuration
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub override_key: String,
    pub request_timeout_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Where the session is mirrored between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    File,
    Redis,
    None,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub dir: PathBuf,
    pub redis_url: String,
    pub ttl_secs: u64,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Self::from_lookup(&process_env)
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(AppConfig {
            api: ApiConfig::from_lookup(lookup)?,
            logging: LoggingConfig::from_lookup(lookup)?,
            cache: CacheConfig::from_lookup(lookup)?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.logging.validate()?;
        self.cache.validate()?;

        Ok(())
    }
}

impl ApiConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        // No compiled-in fallback: without a key the client does not start.
        let override_key = lookup("MULTIPAY_OVERRIDE_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVariable("MULTIPAY_OVERRIDE_KEY".to_string()))?;

        Ok(ApiConfig {
            base_url: lookup("MULTIPAY_API_URL")
                .ok_or_else(|| ConfigError::MissingVariable("MULTIPAY_API_URL".to_string()))?,
            override_key,
            request_timeout_secs: lookup("MULTIPAY_REQUEST_TIMEOUT_SECS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .map_err(|_| {
                    ConfigError::InvalidValue("MULTIPAY_REQUEST_TIMEOUT_SECS".to_string())
                })?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue("MULTIPAY_API_URL".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "MULTIPAY_API_URL must be a valid URL".to_string(),
            ));
        }

        if self.override_key.trim().is_empty() {
            return Err(ConfigError::MissingVariable(
                "MULTIPAY_OVERRIDE_KEY".to_string(),
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "MULTIPAY_REQUEST_TIMEOUT_SECS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("override_key", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl LoggingConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            format: match lookup("LOG_FORMAT")
                .unwrap_or_else(|| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            backend: match lookup("CACHE_BACKEND")
                .unwrap_or_else(|| "file".to_string())
                .to_lowercase()
                .as_str()
            {
                "file" => CacheBackend::File,
                "redis" => CacheBackend::Redis,
                "none" | "off" => CacheBackend::None,
                _ => return Err(ConfigError::InvalidValue("CACHE_BACKEND".to_string())),
            },
            dir: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".multipay")),
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            ttl_secs: lookup("CACHE_TTL_SECS")
                .unwrap_or_else(|| "86400".to_string())
                .parse()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == CacheBackend::Redis
            && !self.redis_url.starts_with("redis://")
            && !self.redis_url.starts_with("rediss://")
        {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        if self.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("CACHE_TTL_SECS".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_loads_minimal_configuration() {
        let lookup = lookup_from(&[
            ("MULTIPAY_API_URL", "https://api.example.com/v1"),
            ("MULTIPAY_OVERRIDE_KEY", "key-123"),
        ]);
        let config = AppConfig::from_lookup(&lookup).expect("config should load");

        assert!(config.validate().is_ok());
        assert_eq!(config.api.request_timeout_secs, None);
        assert_eq!(config.logging.format, LogFormat::Plain);
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert_eq!(config.cache.dir, PathBuf::from(".multipay"));
    }

    #[test]
    fn test_missing_override_key_fails_closed() {
        let lookup = lookup_from(&[("MULTIPAY_API_URL", "https://api.example.com")]);
        assert!(matches!(
            AppConfig::from_lookup(&lookup),
            Err(ConfigError::MissingVariable(name)) if name == "MULTIPAY_OVERRIDE_KEY"
        ));

        let lookup = lookup_from(&[
            ("MULTIPAY_API_URL", "https://api.example.com"),
            ("MULTIPAY_OVERRIDE_KEY", "   "),
        ]);
        assert!(AppConfig::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_invalid_url_validation() {
        let config = ApiConfig {
            base_url: "api.example.com".to_string(),
            override_key: "key".to_string(),
            request_timeout_secs: None,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_cache_backend_is_rejected() {
        let lookup = lookup_from(&[
            ("MULTIPAY_API_URL", "https://api.example.com"),
            ("MULTIPAY_OVERRIDE_KEY", "key"),
            ("CACHE_BACKEND", "memcached"),
        ]);
        assert!(AppConfig::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_override_key_is_redacted_in_debug() {
        let config = ApiConfig {
            base_url: "https://api.example.com".to_string(),
            override_key: "super-secret".to_string(),
            request_timeout_secs: Some(10),
        };

        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
