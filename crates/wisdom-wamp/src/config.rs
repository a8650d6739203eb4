//! Controller configuration.
//!
//! Configuration can come from a file (TOML, YAML or JSON) with environment
//! overrides, or be built programmatically:
//!
//! ```rust
//! use wisdom_wamp::WampConfig;
//!
//! let config = WampConfig::builder()
//!     .hostname("example.com")
//!     .http_port(9001)
//!     .build();
//!
//! assert_eq!(config.base_url(), "http://example.com:9001/wamp");
//! assert_eq!(config.error_url(), "http://example.com:9001/wamp/error");
//! ```

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default environment prefix for overrides (`WISDOM_WAMP__HTTP_PORT=9001`).
pub const ENV_PREFIX: &str = "WISDOM_WAMP";

/// WAMP controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WampConfig {
    /// Host name used to build the base url
    pub hostname: String,
    /// HTTP port; omitted from the base url when it is 80
    pub http_port: u16,
    /// Route of the WAMP endpoint, also used as the publisher channel
    pub route: String,
    /// Path appended to the base url for error URIs
    pub error_route: String,
    /// Identification sent in WELCOME
    pub server_ident: String,
    /// Explicit base url, replacing the one derived from host and port
    pub base_url: Option<String>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub structured: bool,
}

impl Default for WampConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            http_port: 9000,
            route: crate::WAMP_ROUTE.to_string(),
            error_route: crate::WAMP_ERROR_ROUTE.to_string(),
            server_ident: crate::SERVER_IDENT.to_string(),
            base_url: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl WampConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format follows the extension. Environment variables prefixed with
    /// `WISDOM_WAMP__` override file settings, with `__` separating nested
    /// keys (`WISDOM_WAMP__LOGGING__LEVEL=debug`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, has an unknown
    /// extension, or cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create a configuration builder
    pub fn builder() -> WampConfigBuilder {
        WampConfigBuilder::new()
    }

    /// Base url of the WAMP endpoint: `http://<host>[:<port>]<route>`.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        let route = normalize_route(&self.route);
        if self.http_port == 80 {
            format!("http://{}{}", self.hostname, route)
        } else {
            format!("http://{}:{}{}", self.hostname, self.http_port, route)
        }
    }

    /// Prefix of every error URI (`<base>/error`).
    pub fn error_url(&self) -> String {
        format!("{}{}", self.base_url(), normalize_route(&self.error_route))
    }
}

fn normalize_route(route: &str) -> String {
    let route = route.trim_end_matches('/');
    if route.is_empty() || route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}

/// Builder for [`WampConfig`]
#[derive(Debug, Default)]
pub struct WampConfigBuilder {
    config: WampConfig,
}

impl WampConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set host name
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Set HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Set WAMP route
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.config.route = route.into();
        self
    }

    /// Set error route
    pub fn error_route(mut self, route: impl Into<String>) -> Self {
        self.config.error_route = route.into();
        self
    }

    /// Set WELCOME server identification
    pub fn server_ident(mut self, ident: impl Into<String>) -> Self {
        self.config.server_ident = ident.into();
        self
    }

    /// Use an explicit base url
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Build the configuration
    pub fn build(self) -> WampConfig {
        self.config
    }
}
