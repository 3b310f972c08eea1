//! Scan orchestration for one page: the startup sweep, debounced mutation passes,
//! single-batch classification with per-sentence fallback, and the fail-closed abort.

pub mod classify;
pub mod feed;
mod orchestrator;
mod session;

use thiserror::Error;

use segmenter::SegmenterError;
use sentinel_core_types::SentinelError;

pub use classify::{classify_all, Classified};
pub use feed::{change_channel, ChangeFeed, NoChanges};
pub use orchestrator::{ScanConfig, ScanOrchestrator, DEFAULT_STOP_REASON};
pub use session::{segmenter_config, PageSession, SessionPorts};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    /// A classification call failed after the batch fallback; scanning is aborted.
    #[error("classification failed: {0}")]
    Unrecoverable(String),
    #[error("scanning aborted")]
    Aborted,
    #[error("scan configuration invalid: {0}")]
    Config(String),
}

impl From<SegmenterError> for ScanError {
    fn from(err: SegmenterError) -> Self {
        ScanError::Config(err.to_string())
    }
}

impl From<ScanError> for SentinelError {
    fn from(err: ScanError) -> Self {
        SentinelError::new(err.to_string())
    }
}
