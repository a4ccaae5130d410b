use anyhow::Result;
use clap::Parser;

use meridian::cli::args::Cli;
use meridian::cli::context::{init_tracing, load_configuration};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone())?;
    init_tracing(&config.logging)?;
    meridian::cli::run(cli, config).await
}
