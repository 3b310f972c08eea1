use sha2::{Digest, Sha256};

/// Glyph repeated to build redaction placeholders.
pub const REDACT_GLYPH: char = '█';

/// Collapses whitespace runs to single spaces and trims the ends.
pub fn sanitize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length of `text` in characters.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Truncates to at most `max` characters, appending `suffix` when anything was cut.
pub fn truncate_chars(text: &str, max: usize, suffix: &str) -> String {
    if char_len(text) <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(char_len(suffix));
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

/// Placeholder shown in place of redacted text, sized to roughly a quarter of its length.
pub fn redact_label(text: &str) -> String {
    let quarter = (char_len(text) as f64 / 4.0).round() as usize;
    let count = if quarter == 0 { 3 } else { quarter.clamp(3, 12) };
    std::iter::repeat(REDACT_GLYPH).take(count).collect()
}

pub(crate) fn digest_prefix(text: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = hex::encode(hasher.finalize());
    hash[..len.min(hash.len())].to_string()
}
