use page_dom::{Document, DomError, NodeId, TextSlice};
use segmenter::{redact_label, sanitize_text};
use sentinel_core_types::HighlightStyle;
use tracing::trace;

pub const INLINE_CLASS: &str = "sentinel-inline";

const REDACT_TITLE: &str = "Click or hover to reveal redacted text";
const BLUR_TITLE: &str = "Hover to reveal blurred text";

/// Wraps the text between byte offsets `start..end` of `target` in a styled `<span>`.
///
/// Returns `None` when the range is empty or a boundary cannot be resolved to a text
/// node. Partially covered elements are split so the target's text content is unchanged.
pub fn wrap_range(
    doc: &mut Document,
    target: NodeId,
    start: usize,
    end: usize,
    style: HighlightStyle,
) -> Option<NodeId> {
    if start >= end {
        return None;
    }
    let slices = doc.text_nodes(target);
    let (start_node, start_off) = locate(doc, &slices, start, Edge::Start)?;
    let (end_node, end_off) = locate(doc, &slices, end, Edge::End)?;
    match wrap_resolved(doc, target, (start_node, start_off), (end_node, end_off), style) {
        Ok(wrapper) => Some(wrapper),
        Err(err) => {
            trace!(target: "scan.renderer", %target, start, end, error = %err, "span skipped");
            None
        }
    }
}

/// Moves each wrapper's children back in its place and removes the wrapper.
pub fn unwrap_wrappers(doc: &mut Document, wrappers: &[NodeId]) {
    let mut parents = Vec::new();
    for wrapper in wrappers {
        let Some(parent) = doc.parent(*wrapper) else {
            continue;
        };
        for child in doc.children(*wrapper).to_vec() {
            if doc.insert_before(parent, child, *wrapper).is_err() {
                break;
            }
        }
        let _ = doc.detach(*wrapper);
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }
    for parent in parents {
        let _ = doc.normalize(parent);
    }
}

#[derive(Clone, Copy)]
enum Edge {
    Start,
    End,
}

/// Text node holding `offset`. On a boundary between two text nodes a start resolves
/// into the following node and an end into the preceding one, so neither edge splits
/// off an empty piece.
fn locate(
    doc: &Document,
    slices: &[TextSlice],
    offset: usize,
    edge: Edge,
) -> Option<(NodeId, usize)> {
    let slice = slices.iter().find(|slice| match edge {
        Edge::Start => offset >= slice.start && offset < slice.end,
        Edge::End => offset > slice.start && offset <= slice.end,
    })?;
    let local = offset - slice.start;
    let text = doc.text(slice.node)?;
    text.is_char_boundary(local).then_some((slice.node, local))
}

fn wrap_resolved(
    doc: &mut Document,
    target: NodeId,
    (start_node, start_off): (NodeId, usize),
    (end_node, end_off): (NodeId, usize),
    style: HighlightStyle,
) -> Result<NodeId, DomError> {
    // Split the end first so the start offset stays valid when both sit in one node.
    let end_len = doc.text(end_node).map(str::len).unwrap_or_default();
    if end_off < end_len {
        doc.split_text(end_node, end_off)?;
    }
    let first = if start_off > 0 {
        doc.split_text(start_node, start_off)?
    } else {
        start_node
    };
    let last = if start_node == end_node { first } else { end_node };

    let common = common_ancestor(doc, first, last, target)?;
    let head = lift_start(doc, first, common)?;
    let tail = lift_end(doc, last, common)?;

    let covered: Vec<NodeId> = {
        let siblings = doc.children(common);
        let from = siblings.iter().position(|node| *node == head);
        let to = siblings.iter().position(|node| *node == tail);
        match (from, to) {
            (Some(from), Some(to)) if from <= to => siblings[from..=to].to_vec(),
            _ => {
                return Err(DomError::NotAChild {
                    parent: common,
                    reference: head,
                })
            }
        }
    };

    let wrapper = doc.create_element("span");
    doc.set_attr(
        wrapper,
        "class",
        &format!("{INLINE_CLASS} {INLINE_CLASS}--{}", style.as_str()),
    )?;
    doc.insert_before(common, wrapper, head)?;
    for node in covered {
        doc.append_child(wrapper, node)?;
    }

    match style {
        HighlightStyle::Redact => {
            let selected = sanitize_text(&doc.text_content(wrapper));
            doc.set_attr(wrapper, "data-redact", &redact_label(&selected))?;
            doc.set_attr(wrapper, "title", REDACT_TITLE)?;
        }
        HighlightStyle::Blur => doc.set_attr(wrapper, "title", BLUR_TITLE)?,
        HighlightStyle::Highlight => {}
    }
    Ok(wrapper)
}

/// Lowest element containing both text nodes, never above `target`.
fn common_ancestor(
    doc: &Document,
    first: NodeId,
    last: NodeId,
    target: NodeId,
) -> Result<NodeId, DomError> {
    let mut chain = doc.ancestors(first);
    if let Some(limit) = chain.iter().position(|node| *node == target) {
        chain.truncate(limit + 1);
    }
    chain
        .into_iter()
        .find(|candidate| doc.contains(*candidate, last))
        .ok_or(DomError::NotAChild {
            parent: target,
            reference: last,
        })
}

/// Walks from `node` up to a child of `common`, splitting every partially covered
/// ancestor so the range starts at a child boundary.
fn lift_start(doc: &mut Document, node: NodeId, common: NodeId) -> Result<NodeId, DomError> {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if parent == common {
            return Ok(current);
        }
        if doc.prev_sibling(current).is_some() {
            let clone = doc.clone_shallow(parent)?;
            doc.insert_after(parent, clone)?;
            let moved: Vec<NodeId> = doc
                .children(parent)
                .iter()
                .copied()
                .skip_while(|child| *child != current)
                .collect();
            for child in moved {
                doc.append_child(clone, child)?;
            }
            current = clone;
        } else {
            current = parent;
        }
    }
    Err(DomError::NotAChild {
        parent: common,
        reference: node,
    })
}

/// Mirror of [`lift_start`] for the end boundary: trailing siblings move into a clone.
fn lift_end(doc: &mut Document, node: NodeId, common: NodeId) -> Result<NodeId, DomError> {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if parent == common {
            return Ok(current);
        }
        if doc.next_sibling(current).is_some() {
            let clone = doc.clone_shallow(parent)?;
            doc.insert_after(parent, clone)?;
            let moved: Vec<NodeId> = doc
                .children(parent)
                .iter()
                .copied()
                .skip_while(|child| *child != current)
                .skip(1)
                .collect();
            for child in moved {
                doc.append_child(clone, child)?;
            }
        }
        current = parent;
    }
    Err(DomError::NotAChild {
        parent: common,
        reference: node,
    })
}
