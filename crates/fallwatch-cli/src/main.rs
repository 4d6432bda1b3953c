//! FallWatch CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fallwatch_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => fallwatch_cli::commands::run(args).await?,
        Commands::Events(args) => fallwatch_cli::commands::events(args)?,
        Commands::TestChannels(args) => fallwatch_cli::commands::test_channels(args).await?,
        Commands::Version => {
            println!("fallwatch {}", env!("CARGO_PKG_VERSION"));
            println!("fusion core version: {}", fallwatch_fusion::VERSION);
        }
    }

    Ok(())
}
