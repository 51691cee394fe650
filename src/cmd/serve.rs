//! Board server commands — `corkboard serve` and `corkboard init`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use corkboard::board::server::{self, open_database};
use tracing::warn;

use super::{Cli, config_path, load_config};

pub async fn cmd_serve(
    project_dir: &Path,
    cli: &Cli,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let mut toml = load_config(project_dir, cli)?;
    if let Some(port) = port {
        toml.server.port = port;
    }
    if let Some(path) = db_path {
        toml.server.db_path = path;
    }
    toml.server.dev_mode |= dev;

    let problems = toml.validate();
    if !problems.is_empty() {
        for problem in &problems {
            warn!("{}", problem);
        }
        bail!(
            "Invalid configuration ({} problem(s)); run 'corkboard config validate'",
            problems.len()
        );
    }

    server::start_server(toml.server_config()).await
}

pub fn cmd_init(project_dir: &Path, cli: &Cli, db_path: Option<PathBuf>) -> Result<()> {
    let path = config_path(project_dir, cli);
    let mut toml = load_config(project_dir, cli)?;
    if let Some(db_path) = db_path {
        toml.server.db_path = db_path;
    }

    if path.exists() {
        println!("Using existing config at {}", path.display());
    } else {
        corkboard::config::CorkboardToml::default().save(&path)?;
        println!("Created corkboard.toml at {}", path.display());
    }

    open_database(&toml.server.db_path)?;
    println!("Board database initialized at {}", toml.server.db_path.display());
    Ok(())
}
