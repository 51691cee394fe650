//! Configuration view and validation commands — `corkboard config`.

use std::path::Path;

use anyhow::Result;
use corkboard::config::CorkboardToml;

use super::super::ConfigCommands;
use super::{Cli, config_path, load_config};

fn print_sections(toml: &CorkboardToml) {
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!("  db_path = \"{}\"", toml.server.db_path.display());
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();
    println!("[ordering]");
    println!("  step = {}", toml.ordering.step);
    println!("  epsilon = {:e}", toml.ordering.epsilon);
    println!();
    println!("[automation]");
    println!("  max_depth = {}", toml.automation.max_depth);
    println!();
    println!("[bus]");
    println!("  capacity = {}", toml.bus.capacity);
    println!("  heartbeat_secs = {}", toml.bus.heartbeat_secs);
    println!();
}

pub fn cmd_config(project_dir: &Path, cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path(project_dir, cli);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Corkboard Configuration");
            println!("=======================");
            println!();

            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No corkboard.toml found at {}", path.display());
                println!("Using default configuration.");
            }
            println!();

            // Effective values include env overrides.
            print_sections(&load_config(project_dir, cli)?);

            if !path.exists() {
                println!("Run 'corkboard config init' to create a corkboard.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !path.exists() {
                println!("No corkboard.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = CorkboardToml::load(&path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("corkboard.toml already exists at {}", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            CorkboardToml::default().save(&path)?;

            println!("Created corkboard.toml at {}", path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, db_path, dev_mode");
            println!("  - [ordering] step, epsilon");
            println!("  - [automation] max_depth");
            println!("  - [bus] capacity, heartbeat_secs");
            println!();
        }
    }

    Ok(())
}
