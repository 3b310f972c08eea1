use std::time::Duration;

use serde::{Deserialize, Serialize};

use relay_bridge::{FeedbackPayload, ReportType};
use sentinel_policy_center::FeedbackPolicy;

/// User action on an annotation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Dismiss,
    Flag,
}

impl FeedbackAction {
    pub fn report_type(self) -> ReportType {
        match self {
            FeedbackAction::Dismiss => ReportType::NotHate,
            FeedbackAction::Flag => ReportType::Flag,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackAction::Dismiss => "dismiss",
            FeedbackAction::Flag => "flag",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Pending,
    Queued,
    Sent,
    Error,
}

/// One line of the feedback history log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub id: String,
    pub action: FeedbackAction,
    pub report_type: ReportType,
    pub snippet: String,
    pub score: Option<f64>,
    pub status: FeedbackStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// A report waiting in the persisted queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQueueItem {
    pub id: String,
    pub payload: FeedbackPayload,
    pub history_snapshot: FeedbackEntry,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// What the caller knows about the annotation being reported.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackRequest {
    pub action: FeedbackAction,
    pub signature: Option<String>,
    pub text: String,
    pub score: Option<f64>,
}

/// Where a submission ended up.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Sent { entry_id: String },
    Queued { entry_id: String, reason: String },
    Failed { entry_id: String, message: String },
}

impl SubmitOutcome {
    pub fn entry_id(&self) -> &str {
        match self {
            SubmitOutcome::Sent { entry_id }
            | SubmitOutcome::Queued { entry_id, .. }
            | SubmitOutcome::Failed { entry_id, .. } => entry_id,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SubmitOutcome::Sent { .. })
    }
}

/// Result of one flush cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub skipped: bool,
    pub attempted: usize,
    pub sent: usize,
    pub remaining: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackConfig {
    pub retry_attempts: u32,
    pub retry_delays: Vec<Duration>,
    pub history_limit: usize,
    pub flush_after_queue: Duration,
    pub flush_retry: Duration,
    pub snippet_chars: usize,
    pub payload_chars: usize,
    pub pending_key: String,
    pub history_key: String,
}

impl FeedbackConfig {
    pub fn from_policy(policy: &FeedbackPolicy) -> Self {
        Self {
            retry_attempts: policy.retry_attempts.max(1),
            retry_delays: policy
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            history_limit: policy.history_limit.max(1),
            flush_after_queue: Duration::from_millis(policy.flush_after_queue_ms),
            flush_retry: Duration::from_millis(policy.flush_retry_ms),
            snippet_chars: policy.snippet_chars,
            payload_chars: policy.payload_chars,
            pending_key: policy.pending_key.clone(),
            history_key: policy.history_key.clone(),
        }
    }

    /// Delay before the zero-based `attempt`; the last configured delay repeats.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.retry_delays
            .get(attempt as usize)
            .or_else(|| self.retry_delays.last())
            .copied()
            .unwrap_or_default()
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self::from_policy(&sentinel_policy_center::default_policy().feedback)
    }
}
