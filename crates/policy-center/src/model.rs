use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sentinel_core_types::HighlightStyle;

/// Effective configuration of one Sentinel deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentinelPolicy {
    pub scan: ScanPolicy,
    pub feedback: FeedbackPolicy,
    pub overlay: OverlayPolicy,
    pub relay: RelayPolicy,
    /// Dotted paths changed by a layer other than the built-in defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provenance: BTreeMap<String, PolicySource>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Minimum HATE score that flags a sentence.
    pub sensitivity: f64,
    pub highlight_style: HighlightStyle,
    pub debounce_ms: u64,
    pub min_text_length: usize,
    pub text_selectors: Vec<String>,
    pub content_blocks: Vec<String>,
    pub ignore_selectors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPolicy {
    pub retry_attempts: u32,
    pub retry_delays_ms: Vec<u64>,
    pub history_limit: usize,
    pub flush_after_queue_ms: u64,
    pub flush_retry_ms: u64,
    pub snippet_chars: usize,
    pub payload_chars: usize,
    pub pending_key: String,
    pub history_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayPolicy {
    pub frame_interval_ms: u64,
    pub tooltip_gap_px: f64,
    pub viewport_margin_px: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayPolicy {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
    Builtin,
    File,
    Env,
}

impl PolicySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicySource::Builtin => "builtin",
            PolicySource::File => "file",
            PolicySource::Env => "env",
        }
    }
}

impl SentinelPolicy {
    /// Layer that last set the setting at dotted `path`.
    pub fn source_of(&self, path: &str) -> PolicySource {
        self.provenance
            .get(path)
            .copied()
            .unwrap_or(PolicySource::Builtin)
    }
}
