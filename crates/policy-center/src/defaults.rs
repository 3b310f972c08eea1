use sentinel_core_types::HighlightStyle;

use crate::model::{FeedbackPolicy, OverlayPolicy, RelayPolicy, ScanPolicy, SentinelPolicy};

pub const DEFAULT_SENSITIVITY: f64 = 0.8;
pub const PENDING_REPORTS_KEY: &str = "sentinelPendingReports";
pub const FEEDBACK_HISTORY_KEY: &str = "sentinelFeedbackHistory";
pub const SENSITIVITY_KEY: &str = "sensitivity";
pub const HIGHLIGHT_STYLE_KEY: &str = "highlightStyle";

pub fn default_policy() -> SentinelPolicy {
    SentinelPolicy {
        scan: ScanPolicy {
            sensitivity: DEFAULT_SENSITIVITY,
            highlight_style: HighlightStyle::Highlight,
            debounce_ms: 300,
            min_text_length: 5,
            text_selectors: vec![
                r#"div[data-testid="tweetText"]"#.into(),
                r#"div[role="textbox"]"#.into(),
                r#"div[contenteditable="true"]"#.into(),
                "p".into(),
                "blockquote".into(),
                "li".into(),
                "span".into(),
            ],
            content_blocks: vec![
                "article".into(),
                r#"[data-testid="tweet"]"#.into(),
                r#"[role="article"]"#.into(),
                r#"[role="gridcell"]"#.into(),
                r#"[role="listitem"]"#.into(),
            ],
            ignore_selectors: vec![
                ".sentinel-inline".into(),
                ".sentinel-tooltip".into(),
                ".sentinel-inline-controls".into(),
            ],
        },
        feedback: FeedbackPolicy {
            retry_attempts: 3,
            retry_delays_ms: vec![0, 1_000, 3_000],
            history_limit: 50,
            flush_after_queue_ms: 5_000,
            flush_retry_ms: 15_000,
            snippet_chars: 180,
            payload_chars: 4_000,
            pending_key: PENDING_REPORTS_KEY.into(),
            history_key: FEEDBACK_HISTORY_KEY.into(),
        },
        overlay: OverlayPolicy {
            frame_interval_ms: 16,
            tooltip_gap_px: 8.0,
            viewport_margin_px: 12.0,
        },
        relay: RelayPolicy {
            base_url: "https://localhost:5000".into(),
            api_key: None,
            timeout_ms: 10_000,
        },
        provenance: Default::default(),
    }
}
