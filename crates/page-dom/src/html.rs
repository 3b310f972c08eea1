use scraper::{ElementRef, Html, Node};

use crate::document::Document;
use crate::errors::DomError;
use crate::node::{NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

impl Document {
    /// Parses an HTML page into a fresh arena document.
    pub fn from_html(url: &str, markup: &str) -> Result<Self, DomError> {
        let mut doc = Document::new(url)?;
        let parsed = Html::parse_document(markup);
        let html = parsed.root_element();
        let root = doc.root();
        copy_attrs(&mut doc, root, html)?;
        for child in html.children() {
            let Some(element) = ElementRef::wrap(child) else {
                continue;
            };
            match element.value().name() {
                "head" => {
                    let head = doc.head();
                    copy_attrs(&mut doc, head, element)?;
                    import_children(&mut doc, head, element)?;
                }
                "body" => {
                    let body = doc.body();
                    copy_attrs(&mut doc, body, element)?;
                    import_children(&mut doc, body, element)?;
                }
                _ => {
                    let body = doc.body();
                    import_element(&mut doc, body, element)?;
                }
            }
        }
        Ok(doc)
    }

    /// Serialises the subtree rooted at `id`.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn to_html_document(&self) -> String {
        format!("<!DOCTYPE html>{}", self.to_html(self.root()))
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Ok(NodeData::Text(text)) => out.push_str(&escape_text(text)),
            Ok(NodeData::Element(element)) => {
                out.push('<');
                out.push_str(element.tag());
                for (name, value) in element.attrs() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(element.tag());
                out.push('>');
            }
            Err(_) => {}
        }
    }
}

fn copy_attrs(doc: &mut Document, target: NodeId, source: ElementRef<'_>) -> Result<(), DomError> {
    for (name, value) in source.value().attrs() {
        doc.set_attr(target, name, value)?;
    }
    Ok(())
}

fn import_element(doc: &mut Document, parent: NodeId, source: ElementRef<'_>) -> Result<(), DomError> {
    let name = source.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return Ok(());
    }
    let node = doc.create_element(name);
    copy_attrs(doc, node, source)?;
    doc.append_child(parent, node)?;
    import_children(doc, node, source)
}

fn import_children(doc: &mut Document, parent: NodeId, source: ElementRef<'_>) -> Result<(), DomError> {
    for child in source.children() {
        match child.value() {
            Node::Text(text) => {
                let node = doc.create_text(&**text);
                doc.append_child(parent, node)?;
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    import_element(doc, parent, element)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
