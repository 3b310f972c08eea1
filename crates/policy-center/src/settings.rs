use serde_json::Value;

use sentinel_core_types::HighlightStyle;

use crate::model::ScanPolicy;

/// Per-page scan settings after sanitising user-persisted values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanSettings {
    pub threshold: f64,
    pub style: HighlightStyle,
}

impl ScanSettings {
    pub fn from_policy(policy: &ScanPolicy) -> Self {
        Self {
            threshold: policy.sensitivity,
            style: policy.highlight_style,
        }
    }

    /// Applies persisted `sensitivity` and `highlightStyle` values on top of the policy,
    /// keeping the policy value wherever the persisted one is missing or unusable.
    pub fn from_persisted(
        policy: &ScanPolicy,
        sensitivity: Option<&Value>,
        highlight_style: Option<&Value>,
    ) -> Self {
        let mut settings = Self::from_policy(policy);
        if let Some(value) = sensitivity.and_then(Value::as_f64) {
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                settings.threshold = value;
            }
        }
        if let Some(style) = highlight_style
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<HighlightStyle>().ok())
        {
            settings.style = style;
        }
        settings
    }
}
