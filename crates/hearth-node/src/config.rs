//! Layered node configuration
//!
//! A node reads `<dir>/base.toml` and overlays `<dir>/<role>.toml` on top of
//! it. Tables merge recursively and values from the role file win. The base
//! file is required; the role file is optional.
//!
//! ```toml
//! system_name = "hearth"
//!
//! [tick]
//! period_ms = 1000
//! poll_ms = 1
//!
//! [login]
//! token_ttl_secs = 15
//!
//! [placement]
//! mailbox_capacity = 1024
//! hosted = ["player"]
//! ```
//!
//! Any other top-level table is kept verbatim and can be read by the
//! component that owns it through [`NodeConfig::section`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_core::{RoleType, ShardRole};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File every node reads first
pub const BASE_CONFIG_FILE: &str = "base.toml";

/// Configuration resolution failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file could not be read
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A file is not valid TOML or does not match the expected shape
    #[error("invalid config in {origin}: {source}")]
    Parse {
        /// File or section the bad value came from
        origin: String,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but are unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Tick loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Nominal tick period in milliseconds
    pub period_ms: u64,
    /// How often the loop revisits the schedule and quit flag, in milliseconds
    pub poll_ms: u64,
}

impl TickConfig {
    /// Tick period
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Revisit interval
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            poll_ms: 1,
        }
    }
}

/// Login token settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Seconds an unredeemed login token stays valid
    pub token_ttl_secs: u64,
}

impl LoginConfig {
    /// Token time-to-live
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self { token_ttl_secs: 15 }
    }
}

/// Actor placement settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Bounded mailbox size of each actor host
    pub mailbox_capacity: usize,
    /// Groups this node hosts
    pub hosted: Vec<ShardRole>,
    /// Groups this node reaches through a proxy
    pub proxied: Vec<ShardRole>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            hosted: Vec::new(),
            proxied: Vec::new(),
        }
    }
}

/// Resolved configuration of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Actor system name, the authority part of every actor path
    pub system_name: String,
    /// Tick loop timing
    pub tick: TickConfig,
    /// Login token settings
    pub login: LoginConfig,
    /// Actor placement settings
    pub placement: PlacementConfig,
    /// Component-specific tables
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            system_name: "hearth".to_string(),
            tick: TickConfig::default(),
            login: LoginConfig::default(),
            placement: PlacementConfig::default(),
            extra: toml::Table::new(),
        }
    }
}

impl NodeConfig {
    /// Resolve `<dir>/base.toml` overlaid by `<dir>/<role>.toml`
    pub fn load_layered(dir: &Path, role: RoleType) -> Result<Self, ConfigError> {
        let base_path = dir.join(BASE_CONFIG_FILE);
        let mut merged = read_table(&base_path)?;

        let role_path = dir.join(format!("{}.toml", role.as_str()));
        if role_path.is_file() {
            merge_tables(&mut merged, read_table(&role_path)?);
            tracing::debug!(path = %role_path.display(), "applied role config overlay");
        } else {
            tracing::debug!(path = %role_path.display(), "no role config overlay");
        }

        let config = Self::from_table(merged, &base_path.display().to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve from in-memory TOML sources, `role` overlaying `base`
    pub fn from_layers(base: &str, role: Option<&str>) -> Result<Self, ConfigError> {
        let mut merged = parse_table(base, "base layer")?;
        if let Some(role) = role {
            merge_tables(&mut merged, parse_table(role, "role layer")?);
        }
        let config = Self::from_table(merged, "layered config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system_name.is_empty() || self.system_name.contains('/') {
            return Err(ConfigError::invalid(format!(
                "system_name {:?} must be non-empty and contain no '/'",
                self.system_name
            )));
        }
        if self.tick.period_ms == 0 {
            return Err(ConfigError::invalid("tick.period_ms must be positive"));
        }
        if self.tick.poll_ms == 0 || self.tick.poll_ms > self.tick.period_ms {
            return Err(ConfigError::invalid(
                "tick.poll_ms must be positive and no longer than tick.period_ms",
            ));
        }
        if self.login.token_ttl_secs == 0 {
            return Err(ConfigError::invalid("login.token_ttl_secs must be positive"));
        }
        if self.placement.mailbox_capacity == 0 {
            return Err(ConfigError::invalid(
                "placement.mailbox_capacity must be positive",
            ));
        }
        if let Some(role) = self
            .placement
            .hosted
            .iter()
            .find(|role| self.placement.proxied.contains(*role))
        {
            return Err(ConfigError::invalid(format!(
                "group {role} is both hosted and proxied"
            )));
        }
        Ok(())
    }

    /// Deserialize the component-specific table `name`, if present
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.extra.get(name) else {
            return Ok(None);
        };
        value
            .clone()
            .try_into()
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                origin: format!("section [{name}]"),
                source,
            })
    }

    fn from_table(table: toml::Table, origin: &str) -> Result<Self, ConfigError> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                origin: origin.to_string(),
                source,
            })
    }
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(&content, &path.display().to_string())
}

fn parse_table(content: &str, origin: &str) -> Result<toml::Table, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

/// Recursively overlay `overlay` onto `target`; overlay values win
fn merge_tables(target: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (target.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
