//! # Ledger Configuration
//!
//! Configuration for the database and the ledger.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKLEDGER_DB_PATH=/var/lib/stockledger/ledger.db                 │
//! │     STOCKLEDGER_BUSY_TIMEOUT_MS=2000                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, otherwise                                         │
//! │     ~/.config/stockledger/stockledger.toml (Linux)                     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/stockledger/ledger.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! expiring_soon_days = 30
//!
//! [import]
//! auto_create_items = true
//! default_category = "Uncategorized"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use stockledger_core::{ImportSettings, LedgerSettings, DEFAULT_EXPIRING_SOON_DAYS};

// =============================================================================
// Errors
// =============================================================================

/// Configuration load/save failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Section
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Milliseconds a writer waits on another writer's lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "stockledger", "stockledger")
        .map(|dirs| dirs.data_dir().join("stockledger.db"))
        .unwrap_or_else(|| PathBuf::from("stockledger.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Ledger Section
// =============================================================================

/// `[ledger]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Window for the "expiring soon" batch statistic.
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: i64,
}

fn default_expiring_soon_days() -> i64 {
    DEFAULT_EXPIRING_SOON_DAYS
}

impl Default for LedgerSection {
    fn default() -> Self {
        LedgerSection {
            expiring_soon_days: default_expiring_soon_days(),
        }
    }
}

// =============================================================================
// Import Section
// =============================================================================

/// `[import]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSection {
    /// Create unknown items on stock-in instead of failing the row.
    #[serde(default = "default_true")]
    pub auto_create_items: bool,

    /// Category given to items created without a category hint.
    #[serde(default)]
    pub default_category: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ImportSection {
    fn default() -> Self {
        ImportSection {
            auto_create_items: true,
            default_category: None,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete stock ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub ledger: LedgerSection,

    #[serde(default)]
    pub import: ImportSection,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.ledger.expiring_soon_days < 0 {
            return Err(ConfigError::Invalid(
                "ledger.expiring_soon_days must not be negative".into(),
            ));
        }

        if let Some(category) = &self.import.default_category {
            stockledger_core::validation::validate_category_ref(Some(category.as_str()))
                .map_err(|e| ConfigError::Invalid(format!("import.default_category: {}", e)))?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOCKLEDGER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("STOCKLEDGER_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLEDGER_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("STOCKLEDGER_BUSY_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLEDGER_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(value) = lookup("STOCKLEDGER_EXPIRING_SOON_DAYS") {
            match value.parse::<i64>() {
                Ok(days) => self.ledger.expiring_soon_days = days,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLEDGER_EXPIRING_SOON_DAYS"),
            }
        }

        if let Some(value) = lookup("STOCKLEDGER_AUTO_CREATE_ITEMS") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.import.auto_create_items = true,
                "0" | "false" | "no" | "off" => self.import.auto_create_items = false,
                _ => warn!(value = %value, "Ignoring invalid STOCKLEDGER_AUTO_CREATE_ITEMS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockledger", "stockledger")
            .map(|dirs| dirs.config_dir().join("stockledger.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(self.database.path.clone())
                .max_connections(self.database.max_connections)
                .min_connections(self.database.min_connections)
        };

        base.connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            expiring_soon_days: self.ledger.expiring_soon_days,
            import: ImportSettings {
                auto_create_items: self.import.auto_create_items,
                default_category: self.import.default_category.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.ledger.expiring_soon_days, 30);
        assert!(config.import.auto_create_items);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/ledger.db"

            [import]
            auto_create_items = false
            default_category = "Uncategorized"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.ledger.expiring_soon_days, 30);

        let settings = config.ledger_settings();
        assert!(!settings.import.auto_create_items);
        assert_eq!(settings.import.default_category.as_deref(), Some("Uncategorized"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STOCKLEDGER_DB_PATH", ":memory:"),
            ("STOCKLEDGER_BUSY_TIMEOUT_MS", "750"),
            ("STOCKLEDGER_EXPIRING_SOON_DAYS", "14"),
            ("STOCKLEDGER_AUTO_CREATE_ITEMS", "off"),
            ("STOCKLEDGER_MAX_CONNECTIONS", "many"),
        ]
        .into_iter()
        .collect();

        let mut config = LedgerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.busy_timeout_ms, 750);
        assert_eq!(config.ledger.expiring_soon_days, 14);
        assert!(!config.import.auto_create_items);
        // Unparseable values leave the previous setting in place.
        assert_eq!(config.database.max_connections, 5);

        let db = config.db_config();
        assert!(db.is_in_memory());
        assert_eq!(db.busy_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.database.max_connections = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.database.max_connections = 2;
        config.database.min_connections = 3;
        assert!(config.validate().is_err());

        config.database.min_connections = 1;
        config.ledger.expiring_soon_days = -1;
        assert!(config.validate().is_err());

        config.ledger.expiring_soon_days = 7;
        config.import.default_category = Some("x".repeat(500));
        assert!(config.validate().is_err());

        config.import.default_category = Some("Pharmacy".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "stockledger-config-test-{}.toml",
            std::process::id()
        ));

        let mut config = LedgerConfig::default();
        config.database.path = PathBuf::from("/srv/ledger.db");
        config.ledger.expiring_soon_days = 10;
        config.save(Some(path.clone())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[database]"));
        assert!(text.contains("[ledger]"));

        let loaded: LedgerConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!(
            "stockledger-config-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[database\npath = ").unwrap();

        let err = LedgerConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let _ = std::fs::remove_file(&path);
    }
}
