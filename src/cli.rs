use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "filedrop")]
#[command(about = "Drop-directory ingestion engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every configured endpoint until Ctrl+C or SIGTERM
    Run(ConfigArgs),
    /// Validate the configuration and print the effective settings as TOML
    CheckConfig(ConfigArgs),
}

impl Commands {
    pub fn config_args(&self) -> &ConfigArgs {
        match self {
            Commands::Run(args) | Commands::CheckConfig(args) => args,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $FILEDROP_CONFIG, then config/filedrop.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}
