use clap::Subcommand;

use super::config::ConfigArgs;
use super::feedback::FeedbackArgs;
use super::scan::ScanArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Scan an HTML page and annotate flagged sentences
    Scan(ScanArgs),

    /// Inspect or flush the persisted feedback queue
    Feedback(FeedbackArgs),

    /// Inspect the effective policy
    Config(ConfigArgs),
}
