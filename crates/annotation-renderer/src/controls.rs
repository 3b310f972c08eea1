use page_dom::{Document, DomError, NodeId};
use segmenter::redact_label;
use sentinel_core_types::HighlightStyle;

use crate::tooltip::element;

pub const CONTROLS_CLASS: &str = "sentinel-inline-controls";

pub(crate) struct InlineControls {
    pub root: NodeId,
    pub toggle: NodeId,
}

/// Marks wrappers concealed and groups them by the snippet they belong to, keeping
/// first-seen order.
pub(crate) fn group_wrappers(
    doc: &mut Document,
    wrappers: &[NodeId],
    snippets: &[String],
    style: HighlightStyle,
) -> Result<Vec<Vec<NodeId>>, DomError> {
    let mut groups: Vec<(String, Vec<NodeId>)> = Vec::new();
    for (index, wrapper) in wrappers.iter().enumerate() {
        let snippet = snippets
            .get(index)
            .or_else(|| snippets.last())
            .cloned()
            .unwrap_or_default();
        if doc.attr(*wrapper, "data-revealed").is_none() {
            doc.set_attr(*wrapper, "data-revealed", "false")?;
        }
        if style == HighlightStyle::Redact {
            doc.set_attr(*wrapper, "data-redact", &redact_label(&snippet))?;
        }
        let key = if snippet.is_empty() {
            format!("group-{index}")
        } else {
            snippet
        };
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(*wrapper),
            None => groups.push((key, vec![*wrapper])),
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

pub(crate) fn build_controls(
    doc: &mut Document,
    wrappers: &[NodeId],
    score_text: &str,
) -> Result<InlineControls, DomError> {
    let root = element(doc, "div", CONTROLS_CLASS, None)?;
    doc.set_attr(root, "role", "group")?;
    doc.set_attr(root, "aria-label", "Hate speech controls")?;

    let revealed = all_revealed(doc, wrappers);
    let toggle = element(
        doc,
        "button",
        "sentinel-control",
        Some(&toggle_label(revealed, score_text)),
    )?;
    doc.set_attr(toggle, "type", "button")?;
    doc.set_attr(toggle, "data-action", "toggle")?;
    doc.set_attr(toggle, "aria-pressed", if revealed { "true" } else { "false" })?;
    doc.append_child(root, toggle)?;

    for (label, action) in [("Not hate?", "dismiss"), ("Flag", "flag")] {
        let button = element(doc, "button", "sentinel-control-action", Some(label))?;
        doc.set_attr(button, "type", "button")?;
        doc.set_attr(button, "data-action", action)?;
        doc.append_child(root, button)?;
    }
    Ok(InlineControls { root, toggle })
}

/// Reveals every wrapper unless all are already revealed, in which case hides them.
/// Returns the new revealed state.
pub(crate) fn toggle_reveal(
    doc: &mut Document,
    wrappers: &[NodeId],
    toggle: NodeId,
    score_text: &str,
) -> Result<bool, DomError> {
    let reveal = !all_revealed(doc, wrappers);
    let flag = if reveal { "true" } else { "false" };
    for wrapper in wrappers {
        doc.set_attr(*wrapper, "data-revealed", flag)?;
    }
    doc.set_attr(toggle, "aria-pressed", flag)?;
    doc.replace_children_with_text(toggle, &toggle_label(reveal, score_text))?;
    Ok(reveal)
}

fn all_revealed(doc: &Document, wrappers: &[NodeId]) -> bool {
    !wrappers.is_empty()
        && wrappers
            .iter()
            .all(|wrapper| doc.attr(*wrapper, "data-revealed") == Some("true"))
}

fn toggle_label(revealed: bool, score_text: &str) -> String {
    if revealed {
        format!("Hide • {score_text}")
    } else {
        format!("Show • {score_text}")
    }
}
