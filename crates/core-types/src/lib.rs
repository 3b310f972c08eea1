use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label the classifier returns for hateful content.
pub const HATE_LABEL: &str = "HATE";

/// Shared error type for the Sentinel crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SentinelError {
    #[error("{message}")]
    Message { message: String },
}

impl SentinelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Verdict returned by the remote classifier for one text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }

    /// Threshold rule: flagged iff the label is `HATE` and the score reaches the sensitivity.
    pub fn is_flagged(&self, threshold: f64) -> bool {
        self.label == HATE_LABEL && self.score.is_finite() && self.score >= threshold
    }
}

/// Visual treatment applied to flagged spans.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightStyle {
    #[default]
    Highlight,
    Blur,
    Redact,
}

impl HighlightStyle {
    pub const ALL: [HighlightStyle; 3] = [
        HighlightStyle::Highlight,
        HighlightStyle::Blur,
        HighlightStyle::Redact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HighlightStyle::Highlight => "highlight",
            HighlightStyle::Blur => "blur",
            HighlightStyle::Redact => "redact",
        }
    }

    /// Blur and redact hide the text until the reader asks for it.
    pub fn conceals(self) -> bool {
        !matches!(self, HighlightStyle::Highlight)
    }
}

impl fmt::Display for HighlightStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HighlightStyle {
    type Err = SentinelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "highlight" => Ok(HighlightStyle::Highlight),
            "blur" => Ok(HighlightStyle::Blur),
            "redact" => Ok(HighlightStyle::Redact),
            other => Err(SentinelError::new(format!(
                "unknown highlight style: {other}"
            ))),
        }
    }
}

/// Aggregate counters reported after each scan pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub threshold: f64,
    pub style: HighlightStyle,
    pub processed_elements: usize,
    pub flagged_elements: usize,
    pub flagged_segments: usize,
    pub total_sentences: usize,
    pub batch_size: usize,
    pub timestamp: i64,
}

/// Notifications emitted towards UI and telemetry collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum Notification {
    ScanStart {
        #[serde(rename = "batchSize")]
        batch_size: usize,
    },
    ScanProgress {
        active: usize,
        #[serde(rename = "batchSize", skip_serializing_if = "Option::is_none")]
        batch_size: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    ScanComplete {
        flagged_elements: usize,
        flagged_segments: usize,
        summary: ScanSummary,
    },
    ScanError {
        message: String,
    },
    ScanStopped {
        reason: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    TelemetryUpdate {
        last_scan: ScanSummary,
    },
    #[serde(rename_all = "camelCase")]
    FeedbackQueued {
        entry_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FeedbackSent {
        entry_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FeedbackError {
        entry_id: String,
        message: String,
    },
    FeedbackPending {
        count: usize,
    },
    #[serde(rename_all = "camelCase")]
    FeedbackHistoryUpdated {
        entry_id: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ScanStart { .. } => "scan-start",
            Notification::ScanProgress { .. } => "scan-progress",
            Notification::ScanComplete { .. } => "scan-complete",
            Notification::ScanError { .. } => "scan-error",
            Notification::ScanStopped { .. } => "scan-stopped",
            Notification::TelemetryUpdate { .. } => "telemetry-update",
            Notification::FeedbackQueued { .. } => "feedback-queued",
            Notification::FeedbackSent { .. } => "feedback-sent",
            Notification::FeedbackError { .. } => "feedback-error",
            Notification::FeedbackPending { .. } => "feedback-pending",
            Notification::FeedbackHistoryUpdated { .. } => "feedback-history-updated",
        }
    }
}

/// Epoch milliseconds, the timestamp unit used across persisted records.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threshold_rule_requires_hate_label_and_score() {
        assert!(Classification::new("HATE", 0.91).is_flagged(0.8));
        assert!(Classification::new("HATE", 0.8).is_flagged(0.8));
        assert!(!Classification::new("HATE", 0.79).is_flagged(0.8));
        assert!(!Classification::new("NOT_HATE", 0.99).is_flagged(0.8));
        assert!(!Classification::new("HATE", f64::NAN).is_flagged(0.0));
    }

    #[test]
    fn highlight_style_parses_case_insensitively() {
        assert_eq!("Blur".parse::<HighlightStyle>().unwrap(), HighlightStyle::Blur);
        assert_eq!(
            " redact ".parse::<HighlightStyle>().unwrap(),
            HighlightStyle::Redact
        );
        assert!("glow".parse::<HighlightStyle>().is_err());
        assert!(!HighlightStyle::Highlight.conceals());
        assert!(HighlightStyle::Redact.conceals());
    }

    #[test]
    fn notifications_serialize_with_type_and_detail() {
        let value = serde_json::to_value(Notification::FeedbackQueued {
            entry_id: "a:flag:1".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "feedback-queued", "detail": {"entryId": "a:flag:1"}})
        );

        let progress = serde_json::to_value(Notification::ScanProgress {
            active: 0,
            batch_size: None,
        })
        .unwrap();
        assert_eq!(progress, json!({"type": "scan-progress", "detail": {"active": 0}}));
    }

    #[test]
    fn notification_kind_matches_serialized_tag() {
        let note = Notification::ScanComplete {
            flagged_elements: 1,
            flagged_segments: 2,
            summary: ScanSummary::default(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], note.kind());
        assert_eq!(value["detail"]["flaggedSegments"], 2);
    }
}
