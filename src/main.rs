use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use corkboard::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "corkboard")]
#[command(version, about = "Collaborative Kanban board server")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to corkboard.toml. Defaults to .corkboard/corkboard.toml in the project directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP command API and live board sockets
    Serve {
        /// Port to serve on (overrides corkboard.toml and CORKBOARD_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides corkboard.toml and CORKBOARD_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Create the config file and database without starting the server
    Init {
        /// Database path (overrides corkboard.toml and CORKBOARD_DB_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default corkboard.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            let _guard = logging::init(cli.log_format, cli.verbose)?;
            cmd::cmd_serve(&project_dir, &cli, *port, db_path.clone(), *dev).await?;
        }
        Commands::Init { db_path } => cmd::cmd_init(&project_dir, &cli, db_path.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, &cli, command.clone())?,
    }

    Ok(())
}
