//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tessera_ledger::config::{DEFAULT_FEE, DEFAULT_MEMBERSHIP_LENGTH};
use tessera_ledger::LedgerConfig;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger construction parameters.
    #[serde(default)]
    pub ledger: LedgerSection,
    /// Tick source settings.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Ledger parameters. Only read when no snapshot exists yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_fee")]
    pub fee: u64,
    #[serde(default = "default_membership_length")]
    pub membership_length: u64,
}

/// How the host advances ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Ticks advance only through the `advance_ticks` method.
    Manual,
    /// One tick every `tick_interval_ms`.
    Interval,
}

/// Clock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_clock_mode")]
    pub mode: ClockMode,
    /// Milliseconds per tick in interval mode.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Tick to start from when no snapshot exists.
    #[serde(default)]
    pub start_tick: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Snapshot file name inside the data directory.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_fee() -> u64 {
    DEFAULT_FEE
}

fn default_membership_length() -> u64 {
    DEFAULT_MEMBERSHIP_LENGTH
}

fn default_clock_mode() -> ClockMode {
    ClockMode::Manual
}

fn default_tick_interval() -> u64 {
    1_000
}

fn default_snapshot_file() -> String {
    "ledger.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            fee: default_fee(),
            membership_length: default_membership_length(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: default_clock_mode(),
            tick_interval_ms: default_tick_interval(),
            start_tick: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.ledger_config()?;
        if config.clock.mode == ClockMode::Interval && config.clock.tick_interval_ms == 0 {
            anyhow::bail!("clock.tick_interval_ms must be positive in interval mode");
        }
        Ok(config)
    }

    /// Validated ledger parameters.
    pub fn ledger_config(&self) -> anyhow::Result<LedgerConfig> {
        Ok(LedgerConfig::new(
            self.ledger.fee,
            self.ledger.membership_length,
        )?)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Path of the ledger snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.snapshot_file)
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TESSERA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Tessera")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".tessera")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/tessera"))
}
