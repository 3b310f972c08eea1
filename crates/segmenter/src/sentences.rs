use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use sentinel_core_types::Classification;

use crate::text::{char_len, sanitize_text};

static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+[.!?]*").expect("sentence regex"));

/// One sentence of a scan target, addressed by byte offsets into the target's text content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub raw: String,
    pub clean: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

/// Splits on terminal punctuation, keeping it with the preceding fragment.
///
/// Fragments whose whitespace-normalised form is shorter than `min_len` characters are
/// dropped. When nothing survives but the whole text is long enough, the whole text is
/// returned as a single sentence.
pub fn split_sentences(text: &str, min_len: usize) -> Vec<Sentence> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut sentences: Vec<Sentence> = SENTENCE_RE
        .find_iter(text)
        .filter_map(|found| {
            let clean = sanitize_text(found.as_str());
            if clean.is_empty() || char_len(&clean) < min_len {
                return None;
            }
            Some(Sentence {
                raw: found.as_str().to_string(),
                clean,
                start: found.start(),
                end: found.end(),
                classification: None,
            })
        })
        .collect();

    if sentences.is_empty() {
        let clean = sanitize_text(text);
        if !clean.is_empty() && char_len(&clean) >= min_len {
            sentences.push(Sentence {
                raw: text.to_string(),
                clean,
                start: 0,
                end: text.len(),
                classification: None,
            });
        }
    }
    sentences
}
