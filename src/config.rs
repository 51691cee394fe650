//! Configuration loaded from `.corkboard/corkboard.toml`.
//!
//! Layered: file → environment → CLI. Every field has a default, so a
//! missing file or a partial one is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".corkboard/board.db"
//! dev_mode = false
//!
//! [ordering]
//! step = 65536.0
//! epsilon = 1e-6
//!
//! [automation]
//! max_depth = 8
//!
//! [bus]
//! capacity = 256
//! heartbeat_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use corkboard_common::PositionAllocator;
use corkboard_common::position::{BASELINE_STEP, DEFAULT_EPSILON};
use serde::{Deserialize, Serialize};

use crate::board::automation::DEFAULT_MAX_DEPTH;
use crate::board::bus::{DEFAULT_CAPACITY, HEARTBEAT_INTERVAL};
use crate::board::coordinator::CoreSettings;
use crate::board::server::ServerConfig;

/// Directory holding the config file and, by default, the database.
pub const CONFIG_DIR: &str = ".corkboard";
pub const CONFIG_FILE: &str = "corkboard.toml";

pub const ENV_DB_PATH: &str = "CORKBOARD_DB_PATH";
pub const ENV_PORT: &str = "CORKBOARD_PORT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Bind on all interfaces and allow any CORS origin.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("board.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// Fractional position tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingSection {
    /// Spacing for tail inserts and rebalancing.
    #[serde(default = "default_step")]
    pub step: f64,
    /// Smallest neighbour gap that is still split; below it siblings are rebalanced.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_step() -> f64 {
    BASELINE_STEP
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl Default for OrderingSection {
    fn default() -> Self {
        Self {
            step: default_step(),
            epsilon: default_epsilon(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSection {
    /// Nesting bound for rules triggered by other rules within one command.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSection {
    /// Per-board buffer; slower subscribers skip ahead.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_heartbeat_secs() -> u64 {
    HEARTBEAT_INTERVAL.as_secs()
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorkboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub ordering: OrderingSection,
    #[serde(default)]
    pub automation: AutomationSection,
    #[serde(default)]
    pub bus: BusSection,
}

impl CorkboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse corkboard.toml")
    }

    /// Load from `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize corkboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `CORKBOARD_DB_PATH` and `CORKBOARD_PORT` over file values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            self.server.db_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} value '{}'", ENV_PORT, port))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any problems.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(self.ordering.step.is_finite() && self.ordering.step > 0.0) {
            warnings.push(format!(
                "ordering.step must be a positive number, got {}",
                self.ordering.step
            ));
        }
        if !(self.ordering.epsilon.is_finite() && self.ordering.epsilon > 0.0) {
            warnings.push(format!(
                "ordering.epsilon must be a positive number, got {}",
                self.ordering.epsilon
            ));
        } else if self.ordering.epsilon >= self.ordering.step / 2.0 {
            // The first midpoint between fresh siblings must not already count as exhausted.
            warnings.push(format!(
                "ordering.epsilon ({}) must be smaller than half of ordering.step ({})",
                self.ordering.epsilon, self.ordering.step
            ));
        }
        if self.automation.max_depth == 0 {
            warnings.push("automation.max_depth is 0; automation rules will never run".to_string());
        }
        if self.bus.capacity == 0 {
            warnings.push("bus.capacity must be at least 1".to_string());
        }
        if self.bus.heartbeat_secs == 0 {
            warnings.push("bus.heartbeat_secs must be at least 1".to_string());
        }

        warnings
    }

    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            allocator: PositionAllocator::new(self.ordering.step, self.ordering.epsilon),
            max_automation_depth: self.automation.max_depth,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.server.db_path.clone(),
            dev_mode: self.server.dev_mode,
            core: self.core_settings(),
            bus_capacity: self.bus.capacity,
            heartbeat: Duration::from_secs(self.bus.heartbeat_secs),
        }
    }
}

/// Default config file location under `dir`.
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}
