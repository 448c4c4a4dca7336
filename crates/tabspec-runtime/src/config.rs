//! Engine configuration
//!
//! Every key has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! fetch_timeout_ms = 10000
//! selector_page_size = 75
//! grid_page_size = 100
//!
//! [cache]
//! capacity = 256
//! ttl_secs = 30
//!
//! [logging]
//! filter = "info,tabspec_runtime=debug"
//! json = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Datasource fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Rows per selector page
    pub selector_page_size: usize,
    /// Rows per grid page
    pub grid_page_size: usize,
    /// Response cache
    pub cache: CacheConfig,
    /// Tracing subscriber
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Malformed TOML or mistyped keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Unreadable file, malformed TOML or mistyped keys
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Fetch timeout as a duration
    #[inline]
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// With fetch timeout
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    /// With selector page size
    #[inline]
    #[must_use]
    pub fn with_selector_page_size(mut self, size: usize) -> Self {
        self.selector_page_size = size.max(1);
        self
    }

    /// With grid page size
    #[inline]
    #[must_use]
    pub fn with_grid_page_size(mut self, size: usize) -> Self {
        self.grid_page_size = size.max(1);
        self
    }

    /// With response cache settings
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            selector_page_size: 75,
            grid_page_size: 100,
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Response cache settings; capacity 0 disables caching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached responses
    pub capacity: u64,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// Check if caching is on
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.capacity > 0 && self.ttl_secs > 0
    }

    /// Entry lifetime as a duration
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 30,
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
