pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod settings;

pub use defaults::{
    default_policy, FEEDBACK_HISTORY_KEY, HIGHLIGHT_STYLE_KEY, PENDING_REPORTS_KEY, SENSITIVITY_KEY,
};
pub use errors::PolicyError;
pub use loader::{load_policy, load_policy_with_options, validate, LoadOptions};
pub use model::{
    FeedbackPolicy, OverlayPolicy, PolicySource, RelayPolicy, ScanPolicy, SentinelPolicy,
};
pub use settings::ScanSettings;
