use page_dom::{Document, NodeId};

use crate::text::digest_prefix;

/// Attributes consulted, in order, for a durable element identity.
pub const DURABLE_ATTRIBUTES: [&str; 4] = ["data-tweet-id", "data-item-id", "data-id", "id"];

const STATUS_PATH: &str = "/status/";

/// Identity derived from durable attributes, a permalink anchor or an aria reference.
pub fn stable_identifier(doc: &Document, element: NodeId) -> Option<String> {
    doc.element(element)?;
    for attr in DURABLE_ATTRIBUTES {
        if let Some(value) = doc.attr(element, attr).filter(|v| !v.is_empty()) {
            return Some(format!("{attr}:{value}"));
        }
    }

    let permalink = doc.descendants(element).into_iter().find_map(|node| {
        if doc.tag(node) != Some("a") {
            return None;
        }
        doc.attr(node, "href").filter(|href| href.contains(STATUS_PATH))
    });
    if let Some(href) = permalink {
        if let Ok(resolved) = doc.url().join(href) {
            return Some(format!("status:{}", resolved.path()));
        }
    }

    doc.attr(element, "aria-describedby")
        .filter(|v| !v.is_empty())
        .map(|value| format!("aria:{value}"))
}

/// Hostname-namespaced identity of a scan target, deterministic for a page session.
pub fn build_signature(doc: &Document, element: NodeId) -> String {
    let host = doc.hostname();
    if let Some(stable) = stable_identifier(doc, element) {
        return format!("{host}:{stable}");
    }

    let normalized = doc.text_content(element).trim().to_lowercase();
    if !normalized.is_empty() {
        return format!("{host}:text:{}", digest_prefix(&normalized, 16));
    }

    let classes = doc
        .element(element)
        .map(|data| data.classes().collect::<Vec<_>>().join("."))
        .unwrap_or_default();
    let parts: Vec<&str> = [
        doc.attr(element, "data-testid").unwrap_or(""),
        doc.attr(element, "role").unwrap_or(""),
        classes.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect();
    if !parts.is_empty() {
        return format!("{host}:fallback:{}", parts.join(":"));
    }
    format!("{host}:node:{}", element.index())
}
