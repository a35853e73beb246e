//! forgehub - main entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use forgehub::cli::{Cli, run_command};
use forgehub::{Config, Hub};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env()?;
    let hub = Hub::new(config);

    run_command(&hub, cli.command).await
}
