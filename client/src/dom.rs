use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, EventTarget, Node};

use worldmap_shared::document::{SVG_NS, XLINK_NS};
use worldmap_shared::{DocumentChange, MapDocument, NodeId};

/// Live DOM elements paired with their [`MapDocument`] nodes.
pub struct DomMirror {
    root: Element,
    nodes: Vec<Option<Element>>,
    /// Element -> node index, for resolving event targets.
    lookup: js_sys::WeakMap,
}

impl DomMirror {
    /// Copy the loaded SVG into a document mirror. Nothing is journaled: the
    /// elements already exist on the page.
    pub fn snapshot(root: &Element) -> (MapDocument, Self) {
        let mut doc = MapDocument::new(&root.local_name(), attributes_of(root));
        let mut mirror = Self {
            root: root.clone(),
            nodes: Vec::new(),
            lookup: js_sys::WeakMap::new(),
        };
        let root_node = doc.root();
        mirror.register(root_node, root.clone());
        mirror.copy_children(&mut doc, root_node, root);
        debug!(elements = doc.len(), "map document snapshot taken");
        (doc, mirror)
    }

    fn copy_children(&mut self, doc: &mut MapDocument, parent: NodeId, element: &Element) {
        let children = element.children();
        for index in 0..children.length() {
            let Some(child) = children.item(index) else {
                continue;
            };
            let text = if child.child_element_count() == 0 {
                child.text_content().filter(|text| !text.trim().is_empty())
            } else {
                None
            };
            let node = doc.push_element(parent, &child.local_name(), attributes_of(&child), text);
            self.register(node, child.clone());
            self.copy_children(doc, node, &child);
        }
    }

    fn register(&mut self, node: NodeId, element: Element) {
        let index = node.index();
        if self.nodes.len() <= index {
            self.nodes.resize(index + 1, None);
        }
        self.lookup
            .set(element.as_ref(), &JsValue::from_f64(index as f64));
        self.nodes[index] = Some(element);
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.index()).and_then(Option::as_ref)
    }

    /// Nearest mirrored element at or above an event target.
    pub fn node_of(&self, target: Option<EventTarget>) -> Option<NodeId> {
        // Targets belong to the object's document, a separate realm, so
        // `instanceof` based casts would reject them.
        let mut current = target
            .map(|target| target.unchecked_into::<Node>())
            .filter(|node| node.node_type() == Node::ELEMENT_NODE)
            .map(|node| node.unchecked_into::<Element>());
        while let Some(element) = current {
            if let Some(index) = self.lookup.get(element.as_ref()).as_f64() {
                return Some(NodeId::from_index(index as usize));
            }
            current = element.parent_element();
        }
        None
    }

    /// Apply journaled mutations to the live DOM.
    pub fn replay(&mut self, doc: &MapDocument, changes: Vec<DocumentChange>) {
        for change in changes {
            match change {
                DocumentChange::SetAttribute { node, name, value } => {
                    if let Some(element) = self.element(node) {
                        set_attribute(element, &name, &value);
                    }
                }
                DocumentChange::RemoveAttribute { node, name } => {
                    if let Some(element) = self.element(node) {
                        let _ = element.remove_attribute(&name);
                    }
                }
                DocumentChange::SetText { node, text } => {
                    if let Some(element) = self.element(node) {
                        element.set_text_content(Some(&text));
                    }
                }
                DocumentChange::Insert {
                    parent,
                    node,
                    before,
                } => self.insert(doc, parent, node, before),
                DocumentChange::Remove { node } => {
                    if let Some(element) = self.nodes.get_mut(node.index()).and_then(Option::take)
                    {
                        element.remove();
                    }
                }
            }
        }
    }

    fn insert(&mut self, doc: &MapDocument, parent: NodeId, node: NodeId, before: Option<NodeId>) {
        let Some(owner) = self.root.owner_document() else {
            return;
        };
        let Some(parent_el) = self.element(parent).cloned() else {
            debug!(?parent, "insert parent is not mirrored");
            return;
        };
        let Some(element) = self.materialize(&owner, doc, node) else {
            return;
        };
        let before_el = before.and_then(|before| self.element(before).cloned());
        if let Err(err) = parent_el.insert_before(&element, before_el.as_deref()) {
            warn!(?err, "failed to insert map element");
        }
    }

    fn materialize(&mut self, owner: &Document, doc: &MapDocument, node: NodeId) -> Option<Element> {
        let source = doc.get(node)?;
        let element = match owner.create_element_ns(Some(SVG_NS), source.tag()) {
            Ok(element) => element,
            Err(err) => {
                warn!(tag = source.tag(), ?err, "failed to create map element");
                return None;
            }
        };
        for (name, value) in source.attributes() {
            set_attribute(&element, name, value);
        }
        if let Some(text) = source.text() {
            element.set_text_content(Some(text));
        }
        for child in source.children() {
            if let Some(child_el) = self.materialize(owner, doc, *child) {
                let _ = element.append_child(&child_el);
            }
        }
        self.register(node, element.clone());
        Some(element)
    }
}

fn attributes_of(element: &Element) -> Vec<(String, String)> {
    element
        .get_attribute_names()
        .iter()
        .filter_map(|name| name.as_string())
        .filter_map(|name| {
            let value = element.get_attribute(&name)?;
            Some((name, value))
        })
        .collect()
}

fn set_attribute(element: &Element, name: &str, value: &str) {
    let result = if name.starts_with("xlink:") {
        element.set_attribute_ns(Some(XLINK_NS), name, value)
    } else if name == "xmlns" || name.starts_with("xmlns:") {
        return;
    } else {
        element.set_attribute(name, value)
    };
    if let Err(err) = result {
        debug!(name, ?err, "attribute rejected by the DOM");
    }
}
