use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use feedback_queue::{FeedbackConfig, FeedbackQueue};
use relay_bridge::OnlineFlag;
use sentinel_event_bus::{InMemoryBus, NotificationBus};

use super::context::CliContext;
use super::runtime::{build_relay, open_store};

#[derive(Args, Clone, Debug)]
pub struct FeedbackArgs {
    #[command(subcommand)]
    pub action: FeedbackAction,

    /// Directory of the persisted feedback queue
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum FeedbackAction {
    /// Deliver every queued report once
    Flush {
        /// Feedback endpoint base URL
        #[arg(long)]
        relay: Option<String>,

        /// API key sent with every report
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print the feedback history, most recent first
    History,

    /// Print the reports waiting in the queue
    Pending,
}

pub async fn cmd_feedback(args: FeedbackArgs, ctx: &CliContext) -> Result<()> {
    let policy = ctx.policy();
    let store = open_store(args.data_dir)?;
    let (relay_url, api_key) = match &args.action {
        FeedbackAction::Flush { relay, api_key } => (relay.clone(), api_key.clone()),
        _ => (None, None),
    };
    let relay = build_relay(policy, relay_url, api_key)?;
    let queue = FeedbackQueue::new(
        FeedbackConfig::from_policy(&policy.feedback),
        relay,
        Some(store),
        OnlineFlag::new(true),
        InMemoryBus::new(64) as NotificationBus,
    );

    match args.action {
        FeedbackAction::Flush { .. } => print_json(&queue.flush().await)?,
        FeedbackAction::History => print_json(&queue.history().await)?,
        FeedbackAction::Pending => print_json(&queue.pending().await)?,
    }
    queue.shutdown();
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
