use url::Url;

use crate::errors::DomError;
use crate::node::{ElementData, NodeData, NodeId, NodeSlot, Rect, TextSlice, Viewport};
use crate::css::{ElementHandle, SelectorList};

/// Arena-backed page document.
///
/// Nodes are never freed: detaching a node only unlinks it from its parent, so a
/// `NodeId` stays valid for the lifetime of the document and can be checked with
/// [`Document::is_connected`].
#[derive(Clone, Debug)]
pub struct Document {
    url: Url,
    nodes: Vec<NodeSlot>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    viewport: Viewport,
}

impl Document {
    /// Creates an empty `<html><head></head><body></body></html>` document.
    pub fn new(url: &str) -> Result<Self, DomError> {
        let url = Url::parse(url).map_err(|err| DomError::InvalidUrl(format!("{url}: {err}")))?;
        let mut doc = Self {
            url,
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            viewport: Viewport::default(),
        };
        let root = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.link(root, head);
        doc.link(root, body);
        doc.root = root;
        doc.head = head;
        doc.body = body;
        Ok(doc)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.slot(id).map(|slot| &slot.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id.0).map(|slot| &slot.data) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|child| *child == id)?;
        siblings.get(index + 1).copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|child| *child == id)?;
        index.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }

    /// Parent chain from the direct parent up to the root, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// Inclusive containment check.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return self.exists(node);
        }
        self.ancestors(node).contains(&ancestor)
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.exists(id) && self.contains(self.root, id)
    }

    /// Preorder descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.link(parent, child);
        Ok(())
    }

    /// Inserts `child` into `parent` right before `reference`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        if child == reference {
            return Ok(());
        }
        self.check_insert(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(DomError::NotAChild { parent, reference });
        }
        self.detach(child)?;
        let index = self
            .index_in_parent(parent, reference)
            .ok_or(DomError::NotAChild { parent, reference })?;
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Inserts `child` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent = self.parent(reference).ok_or(DomError::NotAChild {
            parent: reference,
            reference,
        })?;
        match self.next_sibling(reference) {
            Some(next) => self.insert_before(parent, child, next),
            None => self.append_child(parent, child),
        }
    }

    /// Unlinks `id` from its parent. Detaching an orphan is a no-op.
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let parent = self.slot(id)?.parent;
        if let Some(parent) = parent {
            self.nodes[parent.0].children.retain(|child| *child != id);
            self.nodes[id.0].parent = None;
        }
        Ok(())
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?.set_attr(name, value);
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.element_mut(id)?.remove_attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .map(|element| element.has_class(class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        if element.has_class(class) {
            return Ok(());
        }
        let joined = match element.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        element.set_attr("class", &joined);
        Ok(())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let element = self.element_mut(id)?;
        let remaining: Vec<&str> = element.classes().filter(|c| *c != class).collect();
        let joined = remaining.join(" ");
        element.set_attr("class", &joined);
        Ok(())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|slot| &slot.data) {
            Some(NodeData::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        match &mut self.slot_mut(id)?.data {
            NodeData::Text(text) => {
                *text = value.to_string();
                Ok(())
            }
            NodeData::Element(_) => Err(DomError::NotText(id)),
        }
    }

    /// Replaces every child of an element with a single text node.
    pub fn replace_children_with_text(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        self.element_mut(id)?;
        for child in self.children(id).to_vec() {
            self.detach(child)?;
        }
        if !value.is_empty() {
            let text = self.create_text(value);
            self.link(id, text);
        }
        Ok(())
    }

    /// Concatenated text of every descendant text node, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    /// Text nodes under `id` with the byte range each one owns in [`Document::text_content`].
    pub fn text_nodes(&self, id: NodeId) -> Vec<TextSlice> {
        let nodes = if self.is_text(id) {
            vec![id]
        } else {
            self.descendants(id)
        };
        let mut offset = 0;
        let mut out = Vec::new();
        for node in nodes {
            if let Some(text) = self.text(node) {
                let start = offset;
                offset += text.len();
                out.push(TextSlice {
                    node,
                    start,
                    end: offset,
                });
            }
        }
        out
    }

    /// Full CSS matching, combinators included, against `id` in its current position.
    pub fn matches(&self, id: NodeId, selector: &SelectorList) -> bool {
        ElementHandle::new(self, id)
            .map(|element| selector.matches(&element))
            .unwrap_or(false)
    }

    /// Nearest inclusive ancestor element matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &SelectorList) -> Option<NodeId> {
        if self.matches(id, selector) {
            return Some(id);
        }
        self.ancestors(id)
            .into_iter()
            .find(|node| self.matches(*node, selector))
    }

    pub fn query_selector(&self, root: NodeId, selector: &SelectorList) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|node| self.matches(*node, selector))
    }

    pub fn query_selector_all(&self, root: NodeId, selector: &SelectorList) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|node| self.matches(*node, selector))
            .collect()
    }

    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|node| self.attr(*node, "id") == Some(value))
    }

    /// Splits a text node at a byte offset. The tail becomes a new text node inserted
    /// right after the original (when it has a parent) and is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let text = self.text(id).ok_or(DomError::NotText(id))?;
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(DomError::BadOffset { node: id, offset });
        }
        let tail = text[offset..].to_string();
        let head = text[..offset].to_string();
        self.set_text(id, &head)?;
        let tail_node = self.create_text(&tail);
        if self.parent(id).is_some() {
            self.insert_after(id, tail_node)?;
        }
        Ok(tail_node)
    }

    /// Copies a node without its children or layout box.
    pub fn clone_shallow(&mut self, id: NodeId) -> Result<NodeId, DomError> {
        let data = match &self.slot(id)?.data {
            NodeData::Element(element) => {
                let mut copy = element.clone();
                copy.rect = None;
                NodeData::Element(copy)
            }
            NodeData::Text(text) => NodeData::Text(text.clone()),
        };
        Ok(self.push(data))
    }

    /// Merges adjacent text nodes and drops empty ones within the subtree of `id`.
    pub fn normalize(&mut self, id: NodeId) -> Result<(), DomError> {
        self.slot(id)?;
        let mut elements = vec![id];
        elements.extend(self.descendants(id));
        for element in elements {
            if !self.is_element(element) {
                continue;
            }
            let mut merged: Vec<NodeId> = Vec::new();
            for child in self.children(element).to_vec() {
                let Some(text) = self.text(child).map(str::to_string) else {
                    merged.push(child);
                    continue;
                };
                if text.is_empty() {
                    self.nodes[child.0].parent = None;
                    continue;
                }
                match merged.last().copied() {
                    Some(previous) if self.is_text(previous) => {
                        if let NodeData::Text(existing) = &mut self.nodes[previous.0].data {
                            existing.push_str(&text);
                        }
                        self.nodes[child.0].parent = None;
                    }
                    _ => merged.push(child),
                }
            }
            self.nodes[element.0].children = merged;
        }
        Ok(())
    }

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.element(id).and_then(|element| element.rect)
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Option<Rect>) -> Result<(), DomError> {
        self.element_mut(id)?.rect = rect;
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeSlot {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn index_in_parent(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|node| *node == child)
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.slot(child)?;
        if !self.is_element(parent) {
            return Err(if self.exists(parent) {
                DomError::NotAnElement(parent)
            } else {
                DomError::UnknownNode(parent)
            });
        }
        if self.contains(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        Ok(())
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot, DomError> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.slot_mut(id)?.data {
            NodeData::Element(element) => Ok(element),
            NodeData::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paragraph(doc: &mut Document, parts: &[&str]) -> NodeId {
        let p = doc.create_element("p");
        for part in parts {
            let text = doc.create_text(part);
            doc.append_child(p, text).unwrap();
        }
        doc.append_child(doc.body(), p).unwrap();
        p
    }

    #[test]
    fn new_document_has_skeleton_and_hostname() {
        let doc = Document::new("https://x.com/home").unwrap();
        assert_eq!(doc.hostname(), "x.com");
        assert_eq!(doc.children(doc.root()), &[doc.head(), doc.body()]);
        assert!(doc.is_connected(doc.body()));
        assert!(Document::new("not a url").is_err());
    }

    #[test]
    fn text_nodes_report_byte_ranges() {
        let mut doc = Document::new("https://example.com").unwrap();
        let p = paragraph(&mut doc, &["Héllo ", "world."]);
        let slices = doc.text_nodes(p);
        assert_eq!(slices.len(), 2);
        assert_eq!((slices[0].start, slices[0].end), (0, 7));
        assert_eq!((slices[1].start, slices[1].end), (7, 13));
        assert_eq!(doc.text_content(p), "Héllo world.");
    }

    #[test]
    fn split_text_inserts_tail_after_original() {
        let mut doc = Document::new("https://example.com").unwrap();
        let p = paragraph(&mut doc, &["abcdef"]);
        let first = doc.children(p)[0];
        let tail = doc.split_text(first, 2).unwrap();
        assert_eq!(doc.children(p), &[first, tail]);
        assert_eq!(doc.text(first), Some("ab"));
        assert_eq!(doc.text(tail), Some("cdef"));
        assert_eq!(doc.text_content(p), "abcdef");

        let accented = doc.create_text("é");
        assert!(matches!(
            doc.split_text(accented, 1),
            Err(DomError::BadOffset { .. })
        ));
    }

    #[test]
    fn normalize_merges_adjacent_text_and_drops_empty() {
        let mut doc = Document::new("https://example.com").unwrap();
        let p = paragraph(&mut doc, &["ab", "", "cd"]);
        let b = doc.create_element("b");
        doc.append_child(p, b).unwrap();
        let tail = doc.create_text("ef");
        doc.append_child(p, tail).unwrap();
        doc.normalize(p).unwrap();
        assert_eq!(doc.children(p).len(), 3);
        assert_eq!(doc.text(doc.children(p)[0]), Some("abcd"));
        assert_eq!(doc.text_content(p), "abcdef");
    }

    #[test]
    fn insert_rejects_cycles_and_foreign_references() {
        let mut doc = Document::new("https://example.com").unwrap();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(doc.body(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        assert!(matches!(
            doc.append_child(inner, outer),
            Err(DomError::Cycle { .. })
        ));
        let stray = doc.create_element("span");
        let body = doc.body();
        assert!(matches!(
            doc.insert_before(body, stray, inner),
            Err(DomError::NotAChild { .. })
        ));
    }

    #[test]
    fn insert_before_and_after_keep_sibling_order() {
        let mut doc = Document::new("https://example.com").unwrap();
        let p = paragraph(&mut doc, &["a", "c"]);
        let (a, c) = (doc.children(p)[0], doc.children(p)[1]);
        let b = doc.create_text("b");
        doc.insert_before(p, b, c).unwrap();
        let d = doc.create_text("d");
        doc.insert_after(c, d).unwrap();
        assert_eq!(doc.children(p), &[a, b, c, d]);
        assert_eq!(doc.next_sibling(b), Some(c));
        assert_eq!(doc.prev_sibling(a), None);
        doc.detach(b).unwrap();
        assert!(!doc.is_connected(b));
        assert_eq!(doc.text_content(p), "acd");
    }

    #[test]
    fn class_helpers_edit_class_attribute() {
        let mut doc = Document::new("https://example.com").unwrap();
        let span = doc.create_element("span");
        doc.add_class(span, "one").unwrap();
        doc.add_class(span, "two").unwrap();
        doc.add_class(span, "one").unwrap();
        assert_eq!(doc.attr(span, "class"), Some("one two"));
        doc.remove_class(span, "one").unwrap();
        assert!(!doc.has_class(span, "one"));
        assert!(doc.has_class(span, "two"));
    }
}
