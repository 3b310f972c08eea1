//! Resolves DOM nodes to canonical scan targets and splits their text into sentences.

mod sentences;
mod signature;
mod text;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use page_dom::{Document, NodeId, SelectorError, SelectorList};
use sentinel_core_types::SentinelError;

pub use sentences::{split_sentences, Sentence};
pub use signature::{build_signature, stable_identifier, DURABLE_ATTRIBUTES};
pub use text::{char_len, redact_label, sanitize_text, truncate_chars, REDACT_GLYPH};

pub const DEFAULT_MIN_TEXT_LENGTH: usize = 5;

#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),
    #[error("segmenter config invalid: {0}")]
    InvalidConfig(String),
}

impl From<SegmenterError> for SentinelError {
    fn from(err: SegmenterError) -> Self {
        SentinelError::new(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Text selectors in probe priority order; the first one is the primary selector.
    pub text_selectors: Vec<String>,
    pub content_blocks: Vec<String>,
    /// Pipeline-owned UI; nodes inside these are never targets.
    pub ignore_selectors: Vec<String>,
    pub min_text_length: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
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
            min_text_length: DEFAULT_MIN_TEXT_LENGTH,
        }
    }
}

/// Compiled selector set used to pick scan targets out of a document.
#[derive(Clone, Debug)]
pub struct Segmenter {
    text_selectors: Vec<SelectorList>,
    primary: SelectorList,
    targets: SelectorList,
    blocks: SelectorList,
    scan: SelectorList,
    ignore: Option<SelectorList>,
    min_text_length: usize,
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self, SegmenterError> {
        if config.text_selectors.is_empty() {
            return Err(SegmenterError::InvalidConfig(
                "text_selectors must not be empty".into(),
            ));
        }
        if config.content_blocks.is_empty() {
            return Err(SegmenterError::InvalidConfig(
                "content_blocks must not be empty".into(),
            ));
        }
        let text_selectors = config
            .text_selectors
            .iter()
            .map(|s| SelectorList::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        let primary = text_selectors[0].clone();
        let targets = SelectorList::from_parts(&config.text_selectors)?;
        let blocks = SelectorList::from_parts(&config.content_blocks)?;
        let scan = SelectorList::from_parts(
            config
                .content_blocks
                .iter()
                .chain(config.text_selectors.iter()),
        )?;
        let ignore = if config.ignore_selectors.is_empty() {
            None
        } else {
            Some(SelectorList::from_parts(&config.ignore_selectors)?)
        };
        Ok(Self {
            text_selectors,
            primary,
            targets,
            blocks,
            scan,
            ignore,
            min_text_length: config.min_text_length,
        })
    }

    pub fn min_text_length(&self) -> usize {
        self.min_text_length
    }

    /// Canonical scan target contributed by `node`, if any.
    pub fn resolve_target(&self, doc: &Document, node: NodeId) -> Option<NodeId> {
        if !doc.is_element(node) || node == doc.body() || node == doc.root() {
            return None;
        }
        if self.is_ignored(doc, node) {
            return None;
        }
        if doc.matches(node, &self.primary) {
            return Some(node);
        }
        if doc.matches(node, &self.targets) {
            return Some(doc.closest(node, &self.primary).unwrap_or(node));
        }
        if let Some(descendant) = self.preferred_descendant(doc, node) {
            return Some(descendant);
        }
        let block = doc.closest(node, &self.blocks)?;
        self.preferred_descendant(doc, block)
            .or_else(|| doc.matches(block, &self.targets).then_some(block))
    }

    /// First descendant, probing text selectors in priority order, whose normalised
    /// text meets the minimum length.
    pub fn preferred_descendant(&self, doc: &Document, root: NodeId) -> Option<NodeId> {
        self.text_selectors.iter().find_map(|selector| {
            let candidate = doc.query_selector(root, selector)?;
            let text = sanitize_text(&doc.text_content(candidate));
            (char_len(&text) >= self.min_text_length).then_some(candidate)
        })
    }

    /// Targets for `node` and every nested block or text element, deduplicated.
    /// A target inside another collected target is dropped so its text is scanned once.
    pub fn collect_targets(&self, doc: &Document, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !doc.is_element(node) {
            return out;
        }
        let mut add = |candidate: NodeId| {
            if let Some(target) = self.resolve_target(doc, candidate) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        };
        add(node);
        for nested in doc.query_selector_all(node, &self.scan) {
            add(nested);
        }
        let collected = out.clone();
        out.retain(|target| {
            !collected
                .iter()
                .any(|other| other != target && doc.contains(*other, *target))
        });
        out
    }

    pub fn split_sentences(&self, text: &str) -> Vec<Sentence> {
        split_sentences(text, self.min_text_length)
    }

    /// Text content of a target split into sentences.
    pub fn segment(&self, doc: &Document, target: NodeId) -> Vec<Sentence> {
        self.split_sentences(&doc.text_content(target))
    }

    pub fn build_signature(&self, doc: &Document, target: NodeId) -> String {
        build_signature(doc, target)
    }

    fn is_ignored(&self, doc: &Document, node: NodeId) -> bool {
        self.ignore
            .as_ref()
            .map(|ignore| doc.closest(node, ignore).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page(markup: &str) -> Document {
        Document::from_html("https://x.com/home", markup).unwrap()
    }

    fn segmenter() -> Segmenter {
        Segmenter::new(&SegmenterConfig::default()).unwrap()
    }

    fn first(doc: &Document, selector: &str) -> NodeId {
        let selector = SelectorList::parse(selector).unwrap();
        doc.query_selector(doc.root(), &selector).unwrap()
    }

    #[test]
    fn primary_match_is_its_own_target() {
        let doc = page(r#"<article><div data-testid="tweetText">You are scum.</div></article>"#);
        let segmenter = segmenter();
        let text = first(&doc, r#"div[data-testid="tweetText"]"#);
        assert_eq!(segmenter.resolve_target(&doc, text), Some(text));
    }

    #[test]
    fn broad_match_widens_to_primary_ancestor() {
        let doc = page(
            r#"<div data-testid="tweetText">You are <span>scum</span>.</div><p>Plain paragraph.</p>"#,
        );
        let segmenter = segmenter();
        let span = first(&doc, "span");
        let primary = first(&doc, r#"div[data-testid="tweetText"]"#);
        assert_eq!(segmenter.resolve_target(&doc, span), Some(primary));
        let p = first(&doc, "p");
        assert_eq!(segmenter.resolve_target(&doc, p), Some(p));
    }

    #[test]
    fn container_probes_descendants_by_priority() {
        let doc = page(
            r#"<section><li>Short</li><p>Hi</p><p>Second paragraph text.</p><blockquote>A long quote here.</blockquote></section>"#,
        );
        let segmenter = segmenter();
        let section = first(&doc, "section");
        // First `p` is too short, so probing moves to the next selector.
        assert_eq!(
            segmenter.resolve_target(&doc, section),
            Some(first(&doc, "blockquote"))
        );
    }

    #[test]
    fn falls_back_to_content_block_ancestor() {
        let doc = page(
            r#"<article><div class="meta"><i>icon</i></div><p>Content lives here.</p></article>"#,
        );
        let segmenter = segmenter();
        let meta = first(&doc, ".meta");
        assert_eq!(segmenter.resolve_target(&doc, meta), Some(first(&doc, "p")));
        assert_eq!(segmenter.resolve_target(&doc, doc.body()), None);
    }

    #[test]
    fn collect_targets_deduplicates_nested_matches() {
        let doc = page(
            r#"<article><div data-testid="tweetText">You are <span>scum</span>. <span>Go away</span></div></article><article><p>Another post here.</p></article>"#,
        );
        let segmenter = segmenter();
        let targets = segmenter.collect_targets(&doc, doc.body());
        let primary = first(&doc, r#"div[data-testid="tweetText"]"#);
        assert_eq!(targets, vec![primary, first(&doc, "p")]);
    }

    #[test]
    fn collect_targets_skips_targets_inside_other_targets() {
        let doc = page(r#"<p>Hello there friend. <span>You are scum.</span></p>"#);
        let segmenter = segmenter();
        let p = first(&doc, "p");
        let span = first(&doc, "span");
        assert_eq!(segmenter.resolve_target(&doc, span), Some(span));
        assert_eq!(segmenter.collect_targets(&doc, doc.body()), vec![p]);
    }

    #[test]
    fn text_selectors_may_use_combinators() {
        let config = SegmenterConfig {
            text_selectors: vec!["article > p".into(), "p".into()],
            ..SegmenterConfig::default()
        };
        let segmenter = Segmenter::new(&config).unwrap();
        let doc = page(
            r#"<p>Outside the post body.</p><article><p>Inside the post body.</p></article>"#,
        );
        let inner = first(&doc, "article p");
        assert_eq!(segmenter.resolve_target(&doc, inner), Some(inner));
        let outer = first(&doc, "p");
        assert_eq!(segmenter.resolve_target(&doc, outer), Some(outer));
        assert_eq!(
            segmenter.preferred_descendant(&doc, doc.body()),
            Some(inner),
            "the first text selector wins even though an earlier p exists"
        );
    }

    #[test]
    fn pipeline_ui_is_never_a_target() {
        let doc = page(
            r#"<div class="sentinel-tooltip"><span>HATE score 0.91</span></div><p>Real text here.</p>"#,
        );
        let segmenter = segmenter();
        let tooltip = first(&doc, ".sentinel-tooltip");
        assert_eq!(segmenter.collect_targets(&doc, tooltip), Vec::<NodeId>::new());
    }

    #[test]
    fn rejects_empty_selector_lists() {
        let config = SegmenterConfig {
            text_selectors: Vec::new(),
            ..SegmenterConfig::default()
        };
        assert!(matches!(
            Segmenter::new(&config),
            Err(SegmenterError::InvalidConfig(_))
        ));
        let config = SegmenterConfig {
            text_selectors: vec!["div >".into()],
            ..SegmenterConfig::default()
        };
        assert!(matches!(
            Segmenter::new(&config),
            Err(SegmenterError::Selector(_))
        ));
    }
}
