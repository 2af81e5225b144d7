//! Database layout configuration and per-connection options.
//!
//! The layout file mirrors the store's database configuration:
//!
//! ```toml
//! [instances.redis]
//! hostname = "127.0.0.1"
//! port = 6379
//!
//! [databases.CONFIG_DB]
//! id = 4
//! separator = "|"
//! instance = "redis"
//! ```

use crate::error::{Error, ErrorClass, ErrorOrigin};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::Path};
use thiserror::Error as ThisError;
use tracing::warn;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read database config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse database config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("database '{db}' references unknown instance '{instance}'")]
    UnknownInstance { db: String, instance: String },
}

impl ConfigError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Read { .. } => ErrorClass::ConnectionUnavailable,
            Self::Parse(_) | Self::UnknownInstance { .. } => ErrorClass::Internal,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(err.class(), ErrorOrigin::Config, err.to_string())
    }
}

///
/// DbNum
///
/// Logical database numbers. Index 3 is unused.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum DbNum {
    ApplDb,
    AsicDb,
    CountersDb,
    ConfigDb,
    FlexCounterDb,
    StateDb,
    SnmpDb,
    ErrorDb,
    UserDb,
}

impl DbNum {
    pub const ALL: [Self; 9] = [
        Self::ApplDb,
        Self::AsicDb,
        Self::CountersDb,
        Self::ConfigDb,
        Self::FlexCounterDb,
        Self::StateDb,
        Self::SnmpDb,
        Self::ErrorDb,
        Self::UserDb,
    ];

    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::ApplDb => 0,
            Self::AsicDb => 1,
            Self::CountersDb => 2,
            Self::ConfigDb => 4,
            Self::FlexCounterDb => 5,
            Self::StateDb => 6,
            Self::SnmpDb => 7,
            Self::ErrorDb => 8,
            Self::UserDb => 9,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ApplDb => "APPL_DB",
            Self::AsicDb => "ASIC_DB",
            Self::CountersDb => "COUNTERS_DB",
            Self::ConfigDb => "CONFIG_DB",
            Self::FlexCounterDb => "FLEX_COUNTER_DB",
            Self::StateDb => "STATE_DB",
            Self::SnmpDb => "SNMP_OVERLAY_DB",
            Self::ErrorDb => "ERROR_DB",
            Self::UserDb => "USER_DB",
        }
    }

    /// Resolve a database by name, as used by the `db-name` annotation.
    /// Accepts both `CONFIG_DB` and the short lowercase form `config`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.into_iter().find(|db| {
            db.name() == upper || db.name().strip_suffix("_DB") == Some(upper.as_str())
        })
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|db| db.index() == index)
    }

    /// Separator used when no layout file overrides it.
    #[must_use]
    pub const fn default_separator(self) -> &'static str {
        match self {
            Self::ConfigDb | Self::StateDb | Self::SnmpDb | Self::UserDb => "|",
            Self::ApplDb | Self::AsicDb | Self::CountersDb | Self::FlexCounterDb | Self::ErrorDb => {
                ":"
            }
        }
    }
}

impl fmt::Display for DbNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// InstanceConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub unix_socket_path: Option<String>,
}

impl InstanceConfig {
    /// `host:port` endpoint, defaulting to the local store.
    #[must_use]
    pub fn tcp_addr(&self) -> String {
        format!(
            "{}:{}",
            self.hostname.as_deref().unwrap_or("localhost"),
            self.port.unwrap_or(6379)
        )
    }
}

///
/// DatabaseConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatabaseConfig {
    pub id: u8,
    #[serde(default)]
    pub separator: Option<String>,
    pub instance: String,
}

///
/// DbConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DbConfig {
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl DbConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.check()?;

        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&raw)
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (db, cfg) in &self.databases {
            if !self.instances.contains_key(&cfg.instance) {
                return Err(ConfigError::UnknownInstance {
                    db: db.clone(),
                    instance: cfg.instance.clone(),
                });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn database(&self, db: DbNum) -> Option<&DatabaseConfig> {
        self.databases.get(db.name())
    }

    #[must_use]
    pub fn instance(&self, db: DbNum) -> Option<&InstanceConfig> {
        self.database(db)
            .and_then(|cfg| self.instances.get(&cfg.instance))
    }
}

///
/// Options
///
/// Per-connection options. Separators are overridden by the layout file
/// when [`Options::resolve`] finds one for the database.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    pub db: DbNum,
    pub init_indicator: Option<String>,
    pub table_separator: String,
    pub key_separator: String,
    pub write_disabled: bool,
    pub enable_on_change: bool,
    pub disable_cvl_check: bool,
}

impl Options {
    #[must_use]
    pub fn new(db: DbNum) -> Self {
        let sep = db.default_separator().to_string();

        Self {
            db,
            init_indicator: None,
            table_separator: sep.clone(),
            key_separator: sep,
            write_disabled: false,
            enable_on_change: false,
            disable_cvl_check: false,
        }
    }

    #[must_use]
    pub fn with_separators(mut self, table: &str, key: &str) -> Self {
        self.table_separator = table.to_string();
        self.key_separator = key.to_string();
        self
    }

    #[must_use]
    pub fn with_init_indicator(mut self, key: impl Into<String>) -> Self {
        self.init_indicator = Some(key.into());
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.write_disabled = true;
        self
    }

    #[must_use]
    pub const fn with_on_change_cache(mut self) -> Self {
        self.enable_on_change = true;
        self
    }

    #[must_use]
    pub const fn without_validation(mut self) -> Self {
        self.disable_cvl_check = true;
        self
    }

    /// Apply the layout file's separator for this database.
    #[must_use]
    pub fn resolve(mut self, cfg: &DbConfig) -> Self {
        let Some(db_cfg) = cfg.database(self.db) else {
            warn!(db = %self.db, "database instance not present in config");
            return self;
        };

        match db_cfg.separator.as_deref() {
            Some(sep) if !sep.is_empty() => {
                if !self.table_separator.is_empty() && self.table_separator != sep {
                    warn!(
                        db = %self.db,
                        options = %self.table_separator,
                        config = %sep,
                        "table separator differs from database config"
                    );
                }
                self.table_separator = sep.to_string();
                self.key_separator = sep.to_string();
            }
            _ => warn!(db = %self.db, "database separator not present in config"),
        }

        self
    }
}
