//! Configuration for the pager session.
//!
//! Configuration can be built in code or loaded from a TOML file:
//!
//! ```toml
//! endpoint = "ws://127.0.0.1:5020/ws"
//! device_token = ""
//! sign_in_timeout_secs = 30
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// WebSocket endpoint of the pager server (default: ws://127.0.0.1:5020/ws).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Device token sent with `login`.
    ///
    /// Device token generation is not implemented yet; the token is empty
    /// unless one is configured.
    #[serde(default)]
    pub device_token: String,
    /// Give up waiting for sign-in after this many seconds (default: wait forever).
    ///
    /// Only the caller stops waiting; the connection attempt keeps running.
    #[serde(default)]
    pub sign_in_timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:5020/ws".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            device_token: String::new(),
            sign_in_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Set the server endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Set the device token sent with `login`.
    pub fn with_device_token(mut self, token: &str) -> Self {
        self.device_token = token.to_string();
        self
    }

    /// Set a deadline for `sign_in`.
    pub fn with_sign_in_timeout(mut self, timeout: Duration) -> Self {
        self.sign_in_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// The `sign_in` deadline, if any.
    pub fn sign_in_timeout(&self) -> Option<Duration> {
        self.sign_in_timeout_secs.map(Duration::from_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_points_at_local_server() {
        let config = SessionConfig::default();
        assert_eq!(config.endpoint, "ws://127.0.0.1:5020/ws");
        assert_eq!(config.device_token, "");
        assert_eq!(config.sign_in_timeout(), None);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
endpoint = "ws://pager.example:9000/ws"
device_token = "dev-1"
sign_in_timeout_secs = 15
"#;

        let config: SessionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.endpoint, "ws://pager.example:9000/ws");
        assert_eq!(config.device_token, "dev-1");
        assert_eq!(config.sign_in_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn config_builder_pattern() {
        let config = SessionConfig::default()
            .with_endpoint("ws://other/ws")
            .with_device_token("abc")
            .with_sign_in_timeout(Duration::from_secs(5));

        assert_eq!(config.endpoint, "ws://other/ws");
        assert_eq!(config.device_token, "abc");
        assert_eq!(config.sign_in_timeout_secs, Some(5));
    }

    #[test]
    fn config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = \"ws://file/ws\"").unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "ws://file/ws");
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = SessionConfig::from_file(Path::new("/nonexistent/pager.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = [not toml").unwrap();

        let result = SessionConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
