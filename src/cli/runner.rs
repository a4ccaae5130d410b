use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::catalog::ChainCatalog;
use crate::cli::args::{Cli, Command};
use crate::cli::chain::{handle_gas_cmd, handle_tvl_cmd};
use crate::cli::context::{init_configs, load_catalog};
use crate::cli::quote::{handle_quote_cmd, handle_watch_cmd};
use crate::cli::transfer::{handle_deposit_cmd, handle_withdraw_cmd};
use crate::config::AppConfig;

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    if config.prometheus.enable {
        crate::monitoring::try_init_prometheus(&config.prometheus.listen)
            .map_err(|err| anyhow!(err))?;
    }

    dispatch(cli.command, config).await
}

async fn dispatch(command: Command, config: AppConfig) -> Result<()> {
    match command {
        Command::Quote(cmd) => {
            let catalog = catalog(&config)?;
            handle_quote_cmd(cmd, &config, &catalog).await?
        }
        Command::Watch(cmd) => {
            let catalog = catalog(&config)?;
            handle_watch_cmd(cmd, &config, &catalog).await?
        }
        Command::Gas(cmd) => {
            let catalog = catalog(&config)?;
            handle_gas_cmd(cmd, &config, &catalog).await?
        }
        Command::Tvl(cmd) => {
            let catalog = catalog(&config)?;
            handle_tvl_cmd(cmd, &config, &catalog).await?
        }
        Command::Deposit(cmd) => handle_deposit_cmd(cmd, &config, catalog(&config)?).await?,
        Command::Withdraw(cmd) => handle_withdraw_cmd(cmd, &config, catalog(&config)?).await?,
        Command::Init(args) => init_configs(args)?,
    }

    Ok(())
}

fn catalog(config: &AppConfig) -> Result<Arc<ChainCatalog>> {
    let catalog = load_catalog(config)?;
    debug!(
        target: "runner",
        chains = catalog.chains().count(),
        vaults = catalog.vaults().count(),
        "链目录已加载"
    );
    Ok(catalog)
}
