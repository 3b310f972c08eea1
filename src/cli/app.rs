use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_logging(&cli.log_level, cli.debug)?;
    debug!("sentinel v{}", env!("CARGO_PKG_VERSION"));

    let LoadedConfig { policy, path } = load_config(cli.config.as_deref())?;
    let ctx = CliContext::new(policy, path);

    dispatch(&cli, &ctx).await.inspect_err(|err| {
        error!("Command failed: {:#}", err);
    })
}
