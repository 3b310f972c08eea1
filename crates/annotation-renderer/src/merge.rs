use serde::{Deserialize, Serialize};

/// A flagged sentence range inside one target's text content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSpan {
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub label: String,
    pub text: String,
}

impl FlaggedSpan {
    pub fn overlaps(&self, other: &FlaggedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Deduplicates spans by exact `(start, end)` keeping the higher score, drops spans that
/// overlap a stronger one, and returns the survivors sorted by `start`.
///
/// Ties keep the first-seen span for equal keys; between overlapping keys the earlier
/// `start` wins, then the first seen.
pub fn merge_spans(spans: Vec<FlaggedSpan>) -> Vec<FlaggedSpan> {
    let mut unique: Vec<(usize, FlaggedSpan)> = Vec::new();
    for (seen, span) in spans.into_iter().enumerate() {
        if span.start >= span.end {
            continue;
        }
        match unique
            .iter_mut()
            .find(|(_, existing)| existing.start == span.start && existing.end == span.end)
        {
            Some((_, existing)) => {
                if score_of(&span) > score_of(existing) {
                    *existing = span;
                }
            }
            None => unique.push((seen, span)),
        }
    }

    unique.sort_by(|(seen_a, a), (seen_b, b)| {
        score_of(b)
            .total_cmp(&score_of(a))
            .then(a.start.cmp(&b.start))
            .then(seen_a.cmp(seen_b))
    });

    let mut kept: Vec<FlaggedSpan> = Vec::with_capacity(unique.len());
    for (_, span) in unique {
        if kept.iter().all(|existing| !existing.overlaps(&span)) {
            kept.push(span);
        }
    }
    kept.sort_by_key(|span| span.start);
    kept
}

fn score_of(span: &FlaggedSpan) -> f64 {
    if span.score.is_finite() {
        span.score
    } else {
        0.0
    }
}
