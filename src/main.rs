mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use filedrop::config::Config;
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let config = match &cli.command.config_args().config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(_) => server::run(config).await?,
        Commands::CheckConfig(_) => {
            let engines = server::assemble(&config)?;
            println!("{}", toml::to_string_pretty(&config)?);
            eprintln!("{} endpoint(s) OK", engines.len());
        }
    }

    Ok(())
}
