//! # vfetch-config
//!
//! Configuration management for Velo Fetch.
//!
//! Loads configuration from:
//! 1. `~/.vfetch/config.toml` (global)
//! 2. An explicit `--config <file>` (overrides global)
//! 3. Environment variables
//! 4. Command-line flags (highest priority, see [`Overrides`])

pub mod logging;

pub use logging::{init_logging, LogLevel};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One mebibyte; `block_size_mb` is expressed in these units.
pub const MIB: u64 = 1024 * 1024;

/// Default block size in MiB.
pub const DEFAULT_BLOCK_SIZE_MB: u64 = 8;

/// Default per-block attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub mount: MountConfig,
    pub log: LogConfig,
}

/// Values supplied on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub tmp_dir: Option<PathBuf>,
    pub block_size_mb: Option<u64>,
    pub mount_path: Option<PathBuf>,
    pub debug: bool,
}

impl Config {
    /// Load config from the global location, an optional explicit file and
    /// the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = Vec::new();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                files.push(global_path);
            }
        }

        if let Some(path) = explicit {
            debug!("Loading config from {:?}", path);
            files.push(path.to_path_buf());
        }

        let mut config = Self::from_layers(files.as_slice())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Layer TOML files in order. Every key a later file sets wins, even when
    /// it sets the built-in default; keys no file sets keep the default.
    pub fn from_layers<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in paths {
            let contents = std::fs::read_to_string(path.as_ref())?;
            merge_tables(&mut merged, contents.parse::<toml::Table>()?);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Global config path: ~/.vfetch/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vfetch/config.toml"))
    }

    /// Apply environment variable overrides through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VFETCH_URL") {
            self.remote.url = url;
        }
        if let Some(token) = lookup("VFETCH_TOKEN") {
            self.remote.token = token;
        }
        if let Some(dir) = lookup("VFETCH_TMP_DIR") {
            self.cache.tmp_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("VFETCH_BLOCK_SIZE_MB") {
            if let Ok(n) = size.parse() {
                self.cache.block_size_mb = n;
            }
        }
        if let Some(path) = lookup("VFETCH_MOUNT") {
            self.mount.path = PathBuf::from(path);
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.url {
            self.remote.url = url.clone();
        }
        if let Some(token) = &overrides.token {
            self.remote.token = token.clone();
        }
        if let Some(dir) = &overrides.tmp_dir {
            self.cache.tmp_dir = dir.clone();
        }
        if let Some(size) = overrides.block_size_mb {
            self.cache.block_size_mb = size;
        }
        if let Some(path) = &overrides.mount_path {
            self.mount.path = path.clone();
        }
        if overrides.debug {
            self.log.debug = true;
        }
    }

    /// Check the fields every mount needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.url.is_empty() {
            return Err(ConfigError::Invalid("remote url is required".into()));
        }
        if self.mount.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("mount path is required".into()));
        }
        self.validate_fetch()
    }

    /// Check only the fetch-related fields (used by `probe`, which never mounts).
    pub fn validate_fetch(&self) -> Result<(), ConfigError> {
        if self.cache.block_size_mb == 0 {
            return Err(ConfigError::Invalid("block_size_mb must be at least 1".into()));
        }
        if self.cache.block_size_mb.checked_mul(MIB).is_none() {
            return Err(ConfigError::Invalid(format!(
                "block_size_mb {} is too large",
                self.cache.block_size_mb
            )));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Block size in bytes.
    pub fn block_size_bytes(&self) -> u64 {
        self.cache.block_size_mb.saturating_mul(MIB)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    /// Render this config as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Recursively overlay `overlay` onto `base`; sections merge, values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(section) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, section);
                    continue;
                }
                base.insert(key, toml::Value::Table(section));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Remote object configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// URL of the remote object
    pub url: String,
    /// Auth token, sent as `X-Auth-Token`
    pub token: String,
}

/// Local cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the cache-store file
    pub tmp_dir: PathBuf,
    /// Block size in MiB
    pub block_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            block_size_mb: DEFAULT_BLOCK_SIZE_MB,
        }
    }
}

/// Block fetch behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per block before a read fails
    pub max_attempts: u32,
    /// Sleep between attempts in milliseconds
    pub retry_backoff_ms: u64,
    /// Per-request timeout in seconds (0 = wait forever)
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: 0,
            request_timeout_secs: 0,
        }
    }
}

/// Mount configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Mount point directory
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
}
