//! The frozen, arena-backed resolved model.
//!
//! Once merging and the modifies pass are done, the tree is flattened into a
//! [`ResolvedModel`]: a vector of [`Node`]s addressed by [`NodeId`], with
//! children stored as indices. Downstream passes only read it.

use std::collections::HashMap;

use indexmap::IndexMap;

use flowsheet_core::{
    element::{Element, Tag, attr},
    flag::{DEFAULT_SCHEMA_VERSION, default_flag, parse_flag},
};

use crate::{
    error::Result,
    identity::{Key, child_keys},
};

/// Index of a node in a [`ResolvedModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One element of the resolved model.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    key: Key,
    tag: Tag,
    attrs: IndexMap<String, String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layer: Option<usize>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn attrs(&self) -> &IndexMap<String, String> {
        &self.attrs
    }

    pub fn name(&self) -> Option<&str> {
        self.attr(attr::NAME)
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

    /// Returns the fragment layer that last touched this node, if known.
    pub fn layer(&self) -> Option<usize> {
        self.layer
    }

    /// Returns the flag `name`, falling back to the schema default.
    pub fn flag(&self, name: &str) -> bool {
        self.attr(name)
            .and_then(parse_flag)
            .unwrap_or_else(|| default_flag(&self.tag, name))
    }

    pub fn is_enabled(&self) -> bool {
        self.flag(attr::ENABLED)
    }
}

/// The merged model, frozen.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    nodes: Vec<Node>,
    by_key: HashMap<Key, NodeId>,
    schema_version: String,
}

impl ResolvedModel {
    /// Freeze a merged `Model` tree.
    ///
    /// `provenance` maps keys to the layer that last touched them.
    pub fn freeze(model: Element, provenance: &IndexMap<Key, usize>) -> Result<Self> {
        let schema_version = model
            .attr(attr::SCHEMA_VERSION)
            .unwrap_or(DEFAULT_SCHEMA_VERSION)
            .to_string();

        let mut resolved = Self {
            nodes: Vec::new(),
            by_key: HashMap::new(),
            schema_version,
        };
        resolved.push(Key::root(), model, None, provenance)?;
        Ok(resolved)
    }

    fn push(
        &mut self,
        key: Key,
        element: Element,
        parent: Option<NodeId>,
        provenance: &IndexMap<Key, usize>,
    ) -> Result<NodeId> {
        let keys = child_keys(key, element.children())?;
        let (tag, attrs, text, children) = element.into_parts();

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            key,
            tag,
            attrs,
            text,
            parent,
            children: Vec::with_capacity(children.len()),
            layer: provenance.get(&key).copied(),
        });
        self.by_key.insert(key, id);

        for (child_key, child) in keys.into_iter().zip(children) {
            let child_id = self.push(child_key, child, Some(id), provenance)?;
            self.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Returns the node at `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this model.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Look a node up by identity.
    pub fn get(&self, key: Key) -> Option<&Node> {
        self.by_key.get(&key).map(|id| self.node(*id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Iterate over all nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> {
        self.node(id).children.iter().map(|child| self.node(*child))
    }

    pub fn children_tagged(&self, id: NodeId, tag: Tag) -> impl Iterator<Item = &Node> {
        self.children(id).filter(move |child| *child.tag() == tag)
    }

    /// Returns the text of the `A` child named `name`.
    pub fn a_value(&self, id: NodeId, name: &str) -> Option<&str> {
        self.children_tagged(id, Tag::A)
            .filter(|child| child.name() == Some(name))
            .last()
            .and_then(Node::text)
    }

    /// Returns the display name of a stream node.
    pub fn stream_name(&self, id: NodeId) -> String {
        match self.node(id).name() {
            Some(name) => name.to_string(),
            None => {
                let node = self.node(id);
                format!(
                    "{} => {}",
                    node.attr(attr::SRC).unwrap_or_default(),
                    node.attr(attr::DST).unwrap_or_default()
                )
            }
        }
    }

    /// Model-level fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = &Node> {
        self.children_tagged(self.root(), Tag::Field)
    }

    /// Look up a model-level field by name.
    pub fn field(&self, name: &str) -> Option<&Node> {
        self.fields().find(|field| field.name() == Some(name))
    }

    pub fn analyses(&self) -> impl Iterator<Item = &Node> {
        self.children_tagged(self.root(), Tag::Analysis)
    }

    pub fn table_updates(&self) -> impl Iterator<Item = &Node> {
        self.children_tagged(self.root(), Tag::TableUpdate)
    }

    /// Rebuild the element tree, e.g. to save the merged model.
    pub fn to_element(&self) -> Element {
        self.element_at(self.root())
    }

    fn element_at(&self, id: NodeId) -> Element {
        let node = self.node(id);
        Element::from_parts(
            node.tag.clone(),
            node.attrs.clone(),
            node.text.clone(),
            node.children
                .iter()
                .map(|child| self.element_at(*child))
                .collect(),
        )
    }
}
