use std::collections::HashMap;
use std::fmt::Write;

use crate::error::MapError;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Stable address of an element inside a [`MapDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }

    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Shape kind derived from the element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Group,
    Path,
    Rect,
    Circle,
    Text,
    Image,
    Other,
}

impl ShapeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "g" => Self::Group,
            "path" => Self::Path,
            "rect" => Self::Rect,
            "circle" => Self::Circle,
            "text" => Self::Text,
            "image" => Self::Image,
            _ => Self::Other,
        }
    }

    /// Kinds admitted as top-level map entries.
    pub fn is_map_entry(self) -> bool {
        matches!(self, Self::Group | Self::Path | Self::Rect)
    }

    /// Simple fillable shapes (no children of their own).
    pub fn is_drawable(self) -> bool {
        matches!(self, Self::Path | Self::Rect)
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    kind: ShapeKind,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

impl Element {
    fn new(tag: &str, attributes: Vec<(String, String)>, text: Option<String>) -> Self {
        Self {
            tag: tag.to_string(),
            kind: ShapeKind::from_tag(tag),
            attributes,
            text,
            parent: None,
            children: Vec::new(),
            attached: true,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// One mutation of the document, replayed by hosts that mirror a live DOM.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: NodeId,
        name: String,
    },
    SetText {
        node: NodeId,
        text: String,
    },
    /// `node` (with its whole subtree) was inserted under `parent`.
    Insert {
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    },
    Remove {
        node: NodeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    pub fn parse(raw: &str) -> Option<Self> {
        let values: Vec<f64> = raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [x, y, width, height] => Some(Self {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => None,
        }
    }
}

/// In-memory mirror of the map SVG: an arena of elements addressed by
/// [`NodeId`], with a journal of every mutation since the last drain.
#[derive(Debug, Clone)]
pub struct MapDocument {
    nodes: Vec<Element>,
    root: NodeId,
    ids: HashMap<String, NodeId>,
    changes: Vec<DocumentChange>,
}

impl MapDocument {
    pub fn new(root_tag: &str, attributes: Vec<(String, String)>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            ids: HashMap::new(),
            changes: Vec::new(),
        };
        doc.root = doc.alloc(None, root_tag, attributes, None);
        doc
    }

    /// Parse a complete SVG document.
    pub fn parse(svg: &str) -> Result<Self, MapError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let parsed = roxmltree::Document::parse_with_options(svg, options)?;
        let root = parsed.root_element();

        let mut attributes: Vec<(String, String)> = root
            .namespaces()
            .filter(|ns| ns.name() != Some("xml"))
            .map(|ns| match ns.name() {
                Some(prefix) => (format!("xmlns:{prefix}"), ns.uri().to_string()),
                None => ("xmlns".to_string(), ns.uri().to_string()),
            })
            .collect();
        attributes.extend(xml_attributes(root));

        let mut doc = Self::new(root.tag_name().name(), attributes);
        let doc_root = doc.root;
        for child in root.children().filter(roxmltree::Node::is_element) {
            doc.import(doc_root, child);
        }
        Ok(doc)
    }

    /// Append an element without journaling it. Used while snapshotting a
    /// live DOM, where the element already exists on the host side.
    pub fn push_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attributes: Vec<(String, String)>,
        text: Option<String>,
    ) -> NodeId {
        self.alloc(Some(parent), tag, attributes, text)
    }

    fn alloc(
        &mut self,
        parent: Option<NodeId>,
        tag: &str,
        attributes: Vec<(String, String)>,
        text: Option<String>,
    ) -> NodeId {
        let node = NodeId(self.nodes.len());
        let mut element = Element::new(tag, attributes, text);
        element.parent = parent;
        if let Some(id) = element.id() {
            self.ids.insert(id.to_string(), node);
        }
        self.nodes.push(element);
        if let Some(parent) = parent
            && let Some(parent_el) = self.nodes.get_mut(parent.0)
        {
            parent_el.children.push(node);
        }
        node
    }

    fn import(&mut self, parent: NodeId, node: roxmltree::Node<'_, '_>) -> NodeId {
        let has_element_children = node.children().any(|child| child.is_element());
        let text = if has_element_children {
            None
        } else {
            let joined: String = node
                .children()
                .filter(|child| child.is_text())
                .filter_map(|child| child.text())
                .collect();
            (!joined.trim().is_empty()).then_some(joined)
        };
        let id = self.push_element(parent, node.tag_name().name(), xml_attributes(node), text);
        for child in node.children().filter(roxmltree::Node::is_element) {
            self.import(id, child);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|el| el.attached)
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.get(node).map(Element::children).unwrap_or(&[])
    }

    pub fn kind(&self, node: NodeId) -> Option<ShapeKind> {
        self.get(node).map(Element::kind)
    }

    pub fn id_of(&self, node: NodeId) -> Option<&str> {
        self.get(node).and_then(Element::id)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.get(node).and_then(|el| el.attribute(name))
    }

    /// Set an attribute; unchanged values are not journaled.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(element) = self.nodes.get_mut(node.0) else {
            return;
        };
        match element.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) if existing.as_str() == value => return,
            Some((_, existing)) => *existing = value.to_string(),
            None => element
                .attributes
                .push((name.to_string(), value.to_string())),
        }
        if name == "id" {
            self.ids.insert(value.to_string(), node);
        }
        self.changes.push(DocumentChange::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let Some(element) = self.nodes.get_mut(node.0) else {
            return;
        };
        let before = element.attributes.len();
        element.attributes.retain(|(key, _)| key != name);
        if element.attributes.len() != before {
            self.changes.push(DocumentChange::RemoveAttribute {
                node,
                name: name.to_string(),
            });
        }
    }

    /// Read one property of the inline `style` attribute.
    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attribute(node, "style")?;
        parse_style(style)
            .into_iter()
            .find(|(key, _)| key == property)
            .map(|(_, value)| value)
    }

    /// Set one property of the inline `style` attribute.
    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        let mut declarations = self
            .attribute(node, "style")
            .map(parse_style)
            .unwrap_or_default();
        match declarations.iter_mut().find(|(key, _)| key == property) {
            Some((_, existing)) => *existing = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }
        let style = declarations
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attribute(node, "style", &style);
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        let Some(element) = self.nodes.get_mut(node.0) else {
            return;
        };
        if element.text.as_deref() == Some(text) {
            return;
        }
        element.text = Some(text.to_string());
        self.changes.push(DocumentChange::SetText {
            node,
            text: text.to_string(),
        });
    }

    /// Insert a new element under `parent`, before `before` when given.
    pub fn insert_element(
        &mut self,
        parent: NodeId,
        before: Option<NodeId>,
        tag: &str,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let node = self.alloc(Some(parent), tag, attributes, None);
        let before = before.filter(|b| self.children(parent).contains(b));
        if let Some(before) = before
            && let Some(parent_el) = self.nodes.get_mut(parent.0)
        {
            parent_el.children.pop();
            let at = parent_el
                .children
                .iter()
                .position(|child| *child == before)
                .unwrap_or(parent_el.children.len());
            parent_el.children.insert(at, node);
        }
        self.changes.push(DocumentChange::Insert {
            parent,
            node,
            before,
        });
        node
    }

    /// Parse an SVG fragment and append its first element under `parent`.
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> Result<NodeId, MapError> {
        let wrapped =
            format!(r#"<svg xmlns="{SVG_NS}" xmlns:xlink="{XLINK_NS}">{markup}</svg>"#);
        let parsed =
            roxmltree::Document::parse(&wrapped).map_err(|e| MapError::Shape(e.to_string()))?;
        let Some(first) = parsed.root_element().children().find(|n| n.is_element()) else {
            return Err(MapError::Shape("markup contains no element".to_string()));
        };
        let node = self.import(parent, first);
        self.changes.push(DocumentChange::Insert {
            parent,
            node,
            before: None,
        });
        Ok(node)
    }

    /// Detach an element (and its subtree) from the document.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root || !self.is_attached(node) {
            return;
        }
        if let Some(parent) = self.get(node).and_then(Element::parent)
            && let Some(parent_el) = self.nodes.get_mut(parent.0)
        {
            parent_el.children.retain(|child| *child != node);
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(element) = self.nodes.get_mut(current.0) else {
                continue;
            };
            element.attached = false;
            stack.extend(element.children.iter().copied());
            if let Some(id) = element.id()
                && self.ids.get(id) == Some(&current)
            {
                let id = id.to_string();
                self.ids.remove(&id);
            }
        }
        self.changes.push(DocumentChange::Remove { node });
    }

    pub fn take_changes(&mut self) -> Vec<DocumentChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn pending_changes(&self) -> &[DocumentChange] {
        &self.changes
    }

    /// Root viewBox, falling back to the width/height attributes.
    pub fn view_box(&self) -> Option<ViewBox> {
        if let Some(view_box) = self.attribute(self.root, "viewBox").and_then(ViewBox::parse) {
            return Some(view_box);
        }
        let width = self.attribute(self.root, "width")?.trim_end_matches("px").parse().ok()?;
        let height = self.attribute(self.root, "height")?.trim_end_matches("px").parse().ok()?;
        Some(ViewBox {
            x: 0.0,
            y: 0.0,
            width,
            height,
        })
    }

    /// Serialize the current state of the document.
    pub fn to_svg_string(&self) -> String {
        let mut out = String::with_capacity(self.nodes.len() * 64);
        self.write_element(&mut out, self.root, true);
        out
    }

    fn write_element(&self, out: &mut String, node: NodeId, is_root: bool) {
        let Some(element) = self.get(node) else {
            return;
        };
        if !element.attached {
            return;
        }
        let _ = write!(out, "<{}", element.tag);
        if is_root && element.attribute("xmlns").is_none() {
            let _ = write!(out, r#" xmlns="{SVG_NS}""#);
        }
        for (name, value) in &element.attributes {
            let _ = write!(out, r#" {}="{}""#, name, escape(value, true));
        }
        if element.children.is_empty() && element.text.is_none() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(text) = &element.text {
            out.push_str(&escape(text, false));
        }
        for child in &element.children {
            self.write_element(out, *child, false);
        }
        let _ = write!(out, "</{}>", element.tag);
    }
}

fn xml_attributes(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    node.attributes()
        .map(|attr| {
            let name = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
                Some(prefix) => format!("{prefix}:{}", attr.name()),
                None => attr.name().to_string(),
            };
            (name, attr.value().to_string())
        })
        .collect()
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn escape(raw: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1000 507">
        <rect id="Ocean" width="1000" height="507"/>
        <g id="DE"><path id="de" d="M0 0"/><path id="DE-BY" d="M1 1"/></g>
        <g id="labels"><text id="DE-label" font-size="6">Germany</text></g>
    </svg>"##;

    #[test]
    fn parse_builds_tree_and_id_index() {
        let doc = MapDocument::parse(SAMPLE).unwrap();
        let root = doc.root();
        assert_eq!(doc.children(root).len(), 3);

        let de = doc.element_by_id("DE").unwrap();
        assert_eq!(doc.kind(de), Some(ShapeKind::Group));
        assert_eq!(doc.children(de).len(), 2);

        let label = doc.element_by_id("DE-label").unwrap();
        assert_eq!(doc.get(label).and_then(Element::text), Some("Germany"));
        assert_eq!(doc.attribute(label, "font-size"), Some("6"));
    }

    #[test]
    fn unchanged_attribute_is_not_journaled() {
        let mut doc = MapDocument::parse(SAMPLE).unwrap();
        let by = doc.element_by_id("DE-BY").unwrap();
        doc.set_attribute(by, "fill", "#ff0000");
        doc.set_attribute(by, "fill", "#ff0000");
        assert_eq!(
            doc.take_changes(),
            vec![DocumentChange::SetAttribute {
                node: by,
                name: "fill".to_string(),
                value: "#ff0000".to_string(),
            }]
        );
        assert!(doc.take_changes().is_empty());
    }

    #[test]
    fn style_properties_merge_into_attribute() {
        let mut doc = MapDocument::parse(SAMPLE).unwrap();
        let ocean = doc.element_by_id("Ocean").unwrap();
        doc.set_style(ocean, "fill", "#D8EBFF");
        doc.set_style(ocean, "stroke", "none");
        doc.set_style(ocean, "fill", "none");
        assert_eq!(doc.attribute(ocean, "style"), Some("fill: none; stroke: none"));
        assert_eq!(doc.style(ocean, "stroke").as_deref(), Some("none"));
    }

    #[test]
    fn insert_before_and_remove_keep_order() {
        let mut doc = MapDocument::parse(SAMPLE).unwrap();
        let root = doc.root();
        let ocean = doc.element_by_id("Ocean").unwrap();
        let image = doc.insert_element(
            root,
            Some(ocean),
            "image",
            vec![("id".to_string(), "Background".to_string())],
        );
        assert_eq!(doc.children(root)[0], image);

        let de = doc.element_by_id("DE").unwrap();
        doc.remove(de);
        assert!(doc.element_by_id("DE").is_none());
        assert!(doc.element_by_id("DE-BY").is_none());
        assert!(!doc.is_attached(de));
        assert_eq!(doc.children(root).len(), 3);
    }

    #[test]
    fn append_markup_imports_fragment() {
        let mut doc = MapDocument::parse(SAMPLE).unwrap();
        let root = doc.root();
        let node = doc
            .append_markup(root, r#"<circle id="pin" cx="10" cy="20" r="2"/>"#)
            .unwrap();
        assert_eq!(doc.kind(node), Some(ShapeKind::Circle));
        assert_eq!(doc.element_by_id("pin"), Some(node));
        assert!(matches!(
            doc.take_changes().last(),
            Some(DocumentChange::Insert { node: n, .. }) if *n == node
        ));

        assert!(doc.append_markup(root, "just text").is_err());
        assert!(doc.append_markup(root, "<g>").is_err());
    }

    #[test]
    fn serialization_reflects_mutations() {
        let mut doc = MapDocument::parse(SAMPLE).unwrap();
        let by = doc.element_by_id("DE-BY").unwrap();
        doc.set_attribute(by, "fill", "#00ff00");
        let label = doc.element_by_id("DE-label").unwrap();
        doc.set_text(label, "Alemanha & Co");
        let svg = doc.to_svg_string();
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg""#));
        assert!(svg.contains(r##"<path id="DE-BY" d="M1 1" fill="#00ff00"/>"##));
        assert!(svg.contains("Alemanha &amp; Co"));

        let reparsed = MapDocument::parse(&svg).unwrap();
        assert_eq!(reparsed.len(), doc.len());
    }

    #[test]
    fn view_box_parses_and_falls_back() {
        let doc = MapDocument::parse(SAMPLE).unwrap();
        assert_eq!(
            doc.view_box(),
            Some(ViewBox {
                x: 0.0,
                y: 0.0,
                width: 1000.0,
                height: 507.0,
            })
        );
        let doc = MapDocument::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="200px" height="100"/>"#,
        )
        .unwrap();
        assert_eq!(doc.view_box().map(|vb| (vb.width, vb.height)), Some((200.0, 100.0)));
        assert_eq!(ViewBox::parse("0,0,10"), None);
    }
}
