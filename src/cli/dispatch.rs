use anyhow::Result;

use super::commands::Commands;
use super::config::cmd_config;
use super::context::CliContext;
use super::env::CliArgs;
use super::feedback::cmd_feedback;
use super::scan::cmd_scan;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Scan(args) => cmd_scan(args, ctx).await,
        Commands::Feedback(args) => cmd_feedback(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx),
    }
}
