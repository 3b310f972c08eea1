//! Ports the scan pipeline consumes from its host: the classifier relay, the feedback
//! relay, a persisted key/value store and a connectivity probe.
//!
//! The relay behind these traits is expected to own multi-host fallback itself; the
//! pipeline only sees a single request/response per call.

pub mod store;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core_types::{Classification, SentinelError};

pub use store::{InMemoryStore, JsonFileStore, PersistedStore, SharedStore, StoreError};

/// Errors surfaced by relay calls.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("Offline")]
    Offline,
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("batch response has {actual} results for {expected} inputs")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Transport and offline failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::Offline)
    }
}

impl From<RelayError> for SentinelError {
    fn from(err: RelayError) -> Self {
        SentinelError::new(err.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<Classification>,
}

impl BatchResponse {
    /// Fails with [`RelayError::ShapeMismatch`] unless there is exactly one result per input.
    pub fn checked(self, expected: usize) -> Result<Vec<Classification>, RelayError> {
        if self.results.len() != expected {
            return Err(RelayError::ShapeMismatch {
                expected,
                actual: self.results.len(),
            });
        }
        Ok(self.results)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    NotHate,
    Flag,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::NotHate => "not_hate",
            ReportType::Flag => "flag",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a feedback report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub text: String,
    pub report_type: ReportType,
}

#[async_trait]
pub trait ClassifierRelay: Send + Sync {
    async fn classify_single(&self, text: &str) -> Result<Classification, RelayError>;

    /// One result per input, in input order. Implementations return whatever the remote
    /// sent; callers validate the shape.
    async fn classify_batch(&self, texts: &[String]) -> Result<BatchResponse, RelayError>;
}

#[async_trait]
pub trait FeedbackRelay: Send + Sync {
    async fn submit_feedback(&self, payload: &FeedbackPayload) -> Result<(), RelayError>;
}

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity probe driven by the host's online/offline transitions.
#[derive(Debug)]
pub struct OnlineFlag {
    online: AtomicBool,
}

impl OnlineFlag {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }

    /// Records the new state and reports whether this was an offline -> online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        online && !was_online
    }
}

impl Connectivity for OnlineFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
