use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_policy;
use crate::errors::PolicyError;
use crate::model::{PolicySource, SentinelPolicy};

const ENV_PREFIX: &str = "SENTINEL__";
const ENV_JSON: &str = "SENTINEL_POLICY_OVERRIDE_JSON";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

/// Defaults, then the YAML file at `path` (when it exists), then environment overrides.
pub fn load_policy(path: Option<&Path>) -> Result<SentinelPolicy, PolicyError> {
    let options = LoadOptions {
        paths: path.map(Path::to_path_buf).into_iter().collect(),
        include_env: true,
    };
    load_policy_with_options(&options)
}

pub fn load_policy_with_options(options: &LoadOptions) -> Result<SentinelPolicy, PolicyError> {
    let defaults = default_policy();
    let mut tree = serde_json::to_value(&defaults).map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let mut applied: Vec<(String, PolicySource)> = Vec::new();

    for path in &options.paths {
        if path.exists() {
            let overlays = overlays_from_file(path)?;
            debug!(target: "policy.loader", path = %path.display(), count = overlays.len(), "applying policy file");
            apply_overlays(&mut tree, overlays, &mut applied)?;
        }
    }

    if options.include_env {
        let overlays = overlays_from_env()?;
        if !overlays.is_empty() {
            debug!(target: "policy.loader", count = overlays.len(), "applying environment overrides");
        }
        apply_overlays(&mut tree, overlays, &mut applied)?;
    }

    let mut policy: SentinelPolicy =
        serde_json::from_value(tree).map_err(|err| PolicyError::InvalidValue(err.to_string()))?;
    for (path, source) in applied {
        policy.provenance.insert(path, source);
    }
    validate(&policy)?;
    Ok(policy)
}

/// Rejects settings the pipeline cannot run with.
pub fn validate(policy: &SentinelPolicy) -> Result<(), PolicyError> {
    let sensitivity = policy.scan.sensitivity;
    if !sensitivity.is_finite() || !(0.0..=1.0).contains(&sensitivity) {
        return Err(PolicyError::InvalidValue(format!(
            "scan.sensitivity must be within [0, 1], got {sensitivity}"
        )));
    }
    if policy.scan.text_selectors.iter().all(|s| s.trim().is_empty()) {
        return Err(PolicyError::Invalid("scan.text_selectors must not be empty".into()));
    }
    if policy.scan.content_blocks.iter().all(|s| s.trim().is_empty()) {
        return Err(PolicyError::Invalid("scan.content_blocks must not be empty".into()));
    }
    if policy.feedback.retry_attempts == 0 {
        return Err(PolicyError::InvalidValue(
            "feedback.retry_attempts must be at least 1".into(),
        ));
    }
    if policy.feedback.history_limit == 0 {
        return Err(PolicyError::InvalidValue(
            "feedback.history_limit must be at least 1".into(),
        ));
    }
    if policy.overlay.frame_interval_ms == 0 {
        return Err(PolicyError::InvalidValue(
            "overlay.frame_interval_ms must be at least 1".into(),
        ));
    }
    Ok(())
}

/// One leaf assignment at a dotted path such as `scan.sensitivity`.
struct Overlay {
    path: String,
    value: Value,
    source: PolicySource,
}

fn apply_overlays(
    tree: &mut Value,
    overlays: Vec<Overlay>,
    applied: &mut Vec<(String, PolicySource)>,
) -> Result<(), PolicyError> {
    for Overlay {
        path,
        value,
        source,
    } in overlays
    {
        set_path(tree, &path, value)?;
        applied.retain(|(seen, _)| seen != &path);
        applied.push((path, source));
    }
    Ok(())
}

/// Replaces the leaf at a dotted path; every segment must already exist in the tree.
fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<(), PolicyError> {
    let unsupported = || PolicyError::UnsupportedPath(path.to_string());
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut cursor = tree;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        cursor = cursor
            .as_object_mut()
            .and_then(|map| map.get_mut(segment))
            .ok_or_else(unsupported)?;
    }
    let slot = cursor
        .as_object_mut()
        .and_then(|map| map.get_mut(leaf))
        .ok_or_else(unsupported)?;
    if slot.is_object() {
        return Err(unsupported());
    }
    *slot = value;
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<Overlay>, PolicyError> {
    let raw = fs::read_to_string(path).map_err(|err| PolicyError::Io(err.to_string()))?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let tree = serde_json::to_value(yaml).map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let mut overlays = Vec::new();
    collect_leaves(tree, String::new(), PolicySource::File, &mut overlays);
    Ok(overlays)
}

/// `SENTINEL__SCAN__DEBOUNCE_MS=500` style variables in name order, then the JSON document.
fn overlays_from_env() -> Result<Vec<Overlay>, PolicyError> {
    let mut vars: Vec<(String, String)> = env::vars()
        .filter_map(|(name, raw)| {
            let path = env_path(name.strip_prefix(ENV_PREFIX)?)?;
            Some((path, raw))
        })
        .collect();
    vars.sort();

    let mut overlays: Vec<Overlay> = vars
        .into_iter()
        .map(|(path, raw)| Overlay {
            path,
            value: env_value(&raw),
            source: PolicySource::Env,
        })
        .collect();

    let document = env::var(ENV_JSON).unwrap_or_default();
    if !document.trim().is_empty() {
        let tree: Value =
            serde_json::from_str(&document).map_err(|err| PolicyError::Invalid(err.to_string()))?;
        collect_leaves(tree, String::new(), PolicySource::Env, &mut overlays);
    }
    Ok(overlays)
}

fn env_path(suffix: &str) -> Option<String> {
    let segments: Vec<String> = suffix
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    (!segments.is_empty()).then(|| segments.join("."))
}

/// JSON when it parses, otherwise the raw string; empty means null.
fn env_value(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

fn collect_leaves(value: Value, path: String, source: PolicySource, out: &mut Vec<Overlay>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = key.trim().to_ascii_lowercase();
                let child_path = if path.is_empty() {
                    key
                } else {
                    format!("{path}.{key}")
                };
                collect_leaves(child, child_path, source, out);
            }
        }
        leaf if !path.is_empty() => out.push(Overlay {
            path,
            value: leaf,
            source,
        }),
        _ => {}
    }
}
