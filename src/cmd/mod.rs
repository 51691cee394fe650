//! CLI command implementations.
//!
//! | Module   | Commands handled   |
//! |----------|--------------------|
//! | `serve`  | `Serve`, `Init`    |
//! | `config` | `Config`           |

pub mod config;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::Result;
use corkboard::config::{CorkboardToml, default_config_path};

pub use config::cmd_config;
pub use serve::{cmd_init, cmd_serve};

use super::Cli;

/// Config file path: `--config` if given, else under the project directory.
pub fn config_path(project_dir: &Path, cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| default_config_path(project_dir))
}

/// Load the config file (or defaults), apply environment overrides and
/// anchor a relative database path at the project directory.
pub fn load_config(project_dir: &Path, cli: &Cli) -> Result<CorkboardToml> {
    let mut toml = CorkboardToml::load_or_default(&config_path(project_dir, cli))?;
    toml.apply_env()?;
    if toml.server.db_path.is_relative() {
        toml.server.db_path = project_dir.join(&toml.server.db_path);
    }
    Ok(toml)
}
