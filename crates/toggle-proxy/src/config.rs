//! Proxy configuration
//!
//! Layered, later layers win:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config` or `TOGGLE_PROXY_CONFIG`)
//! 3. Environment (`PYTHON_API_URL`, `NEXT_PUBLIC_INDUSTRY`, `TOGGLE_PROXY_LISTEN`)
//! 4. Command line flags (applied by the binary)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toggle_core::Industry;

/// Config file variable, read by the binary's `--config` flag
pub const ENV_CONFIG: &str = "TOGGLE_PROXY_CONFIG";
/// Backend base URL variable
pub const ENV_BACKEND_URL: &str = "PYTHON_API_URL";
/// Industry skin variable
pub const ENV_INDUSTRY: &str = "NEXT_PUBLIC_INDUSTRY";
/// Listen address variable
pub const ENV_LISTEN: &str = "TOGGLE_PROXY_LISTEN";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },
    /// File is not valid TOML for this schema
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// Cause
        source: toml::de::Error,
    },
    /// A value is out of range
    #[error("invalid {key}: {message}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the proxy binds
    pub listen: SocketAddr,
    /// Python backend base URL
    pub backend_url: String,
    /// Industry reported by `/health`
    pub industry: Industry,
    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            backend_url: "http://localhost:8000".to_string(),
            industry: Industry::default(),
            request_timeout_secs: 120,
        }
    }
}

impl ProxyConfig {
    /// Defaults, then `path` if given, then the process environment
    ///
    /// # Errors
    /// - `ConfigError::Read` / `ConfigError::Parse` for a bad file
    /// - `ConfigError::Invalid` for bad environment values
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file over the defaults
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override from environment lookups; blank values are ignored
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when the listen address does not parse
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BACKEND_URL) {
            self.backend_url = url.trim().to_string();
        }
        if let Some(industry) = get(ENV_INDUSTRY) {
            self.industry = Industry::from_flag(&industry);
        }
        if let Some(listen) = get(ENV_LISTEN) {
            self.listen = listen
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("listen", format!("{listen}: {e}")))?;
        }
        Ok(())
    }

    /// Check values
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for a non-HTTP backend URL or a zero timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "backend_url",
                format!("expected an http(s) URL, got '{}'", self.backend_url),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Upstream timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_backend_conventions() {
        let config = ProxyConfig::default();
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.industry, Industry::Banking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend_url = \"http://backend:9000\"\nindustry = \"mental-health\""
        )
        .unwrap();

        let config = ProxyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backend_url, "http://backend:9000");
        assert_eq!(config.industry, Industry::MentalHealth);
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"http://x\"").unwrap();
        assert!(matches!(
            ProxyConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = ProxyConfig::default();
        config
            .apply_env(env(&[
                (ENV_BACKEND_URL, "https://api.internal"),
                (ENV_INDUSTRY, "investment"),
                (ENV_LISTEN, "0.0.0.0:8080"),
            ]))
            .unwrap();

        assert_eq!(config.backend_url, "https://api.internal");
        assert_eq!(config.industry, Industry::Investment);
        assert_eq!(config.listen.port(), 8080);
    }

    #[test]
    fn blank_env_ignored_and_bad_listen_rejected() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[(ENV_BACKEND_URL, "  ")])).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8000");

        let err = config
            .apply_env(env(&[(ENV_LISTEN, "not-an-addr")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "listen", .. }));
    }

    #[test]
    fn unknown_industry_falls_back() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[(ENV_INDUSTRY, "retail")])).unwrap();
        assert_eq!(config.industry, Industry::Banking);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = ProxyConfig {
            backend_url: "localhost:8000".into(),
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProxyConfig {
            request_timeout_secs: 0,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
