//! User feedback delivery: bounded immediate retry, then a persisted queue flushed in the
//! background, plus a capped most-recent-first history log.

mod model;
mod queue;

pub use model::{
    FeedbackAction, FeedbackConfig, FeedbackEntry, FeedbackQueueItem, FeedbackRequest,
    FeedbackStatus, FlushReport, SubmitOutcome,
};
pub use queue::FeedbackQueue;
