//! The already-parsed fragment tree.
//!
//! A fragment document is handed to the resolver as a tree of [`Element`]s:
//! a typed [`Tag`], the XML attributes in document order, optional text
//! content and ordered children. Front ends (an XML reader, a JSON loader, a
//! test) build these trees; the resolver never sees raw markup.
//!
//! Elements serialize with `serde` as
//! `{"tag": "Field", "attrs": {"name": "R1"}, "children": [...]}`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::flag::{default_flag, parse_flag};

/// Attribute names with meaning to the resolver.
pub mod attr {
    pub const NAME: &str = "name";
    pub const ENABLED: &str = "enabled";
    pub const EXTEND: &str = "extend";
    pub const DELETE: &str = "delete";
    pub const MODIFIES: &str = "modifies";
    pub const MODIFIED: &str = "modified";
    pub const IMPUTE: &str = "impute";
    pub const IMPUTE_START: &str = "impute-start";
    pub const CYCLE_START: &str = "cycle-start";
    pub const BOUNDARY: &str = "boundary";
    pub const SRC: &str = "src";
    pub const DST: &str = "dst";
    pub const DEFAULT: &str = "default";
    pub const REGEX: &str = "regex";
    pub const CLASS: &str = "class";
    pub const PHASE: &str = "phase";
    pub const ROW: &str = "row";
    pub const COL: &str = "col";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const TYPE: &str = "type";
    pub const UNIT: &str = "unit";
    pub const OPTIONS: &str = "options";
    pub const EXCLUSIVE: &str = "exclusive";
    pub const SYNCHRONIZED: &str = "synchronized";
    pub const DESC: &str = "desc";
    pub const GT: &str = "GT";
    pub const GE: &str = "GE";
    pub const LT: &str = "LT";
    pub const LE: &str = "LE";
}

/// Element types of the flowsheet schema.
///
/// Unknown element names are preserved as [`Tag::Other`] so that they merge
/// and round-trip like any other element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    Model,
    AttrDefs,
    ClassAttrs,
    AttrDef,
    Options,
    Option,
    Analysis,
    Field,
    Group,
    A,
    Aggregator,
    Process,
    ProcessChoice,
    ProcessGroup,
    ProcessRef,
    StreamRef,
    Stream,
    Component,
    Contains,
    TableUpdate,
    Cell,
    Other(String),
}

impl Tag {
    /// Returns the element name as it appears in fragment documents.
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Model => "Model",
            Tag::AttrDefs => "AttrDefs",
            Tag::ClassAttrs => "ClassAttrs",
            Tag::AttrDef => "AttrDef",
            Tag::Options => "Options",
            Tag::Option => "Option",
            Tag::Analysis => "Analysis",
            Tag::Field => "Field",
            Tag::Group => "Group",
            Tag::A => "A",
            Tag::Aggregator => "Aggregator",
            Tag::Process => "Process",
            Tag::ProcessChoice => "ProcessChoice",
            Tag::ProcessGroup => "ProcessGroup",
            Tag::ProcessRef => "ProcessRef",
            Tag::StreamRef => "StreamRef",
            Tag::Stream => "Stream",
            Tag::Component => "Component",
            Tag::Contains => "Contains",
            Tag::TableUpdate => "TableUpdate",
            Tag::Cell => "Cell",
            Tag::Other(name) => name,
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        match name {
            "Model" => Tag::Model,
            "AttrDefs" => Tag::AttrDefs,
            "ClassAttrs" => Tag::ClassAttrs,
            "AttrDef" => Tag::AttrDef,
            "Options" => Tag::Options,
            "Option" => Tag::Option,
            "Analysis" => Tag::Analysis,
            "Field" => Tag::Field,
            "Group" => Tag::Group,
            "A" => Tag::A,
            "Aggregator" => Tag::Aggregator,
            "Process" => Tag::Process,
            "ProcessChoice" => Tag::ProcessChoice,
            "ProcessGroup" => Tag::ProcessGroup,
            "ProcessRef" => Tag::ProcessRef,
            "StreamRef" => Tag::StreamRef,
            "Stream" => Tag::Stream,
            "Component" => Tag::Component,
            "Contains" => Tag::Contains,
            "TableUpdate" => Tag::TableUpdate,
            "Cell" => Tag::Cell,
            other => Tag::Other(other.to_string()),
        }
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::from(name.as_str())
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a fragment tree.
///
/// # Examples
///
/// ```
/// use flowsheet_core::element::{Element, Tag};
///
/// let field = Element::named(Tag::Field, "R1")
///     .with_child(
///         Element::new(Tag::Stream)
///             .with_attr("src", "A")
///             .with_attr("dst", "B"),
///     );
///
/// assert_eq!(field.name(), Some("R1"));
/// assert!(field.is_enabled());
/// assert_eq!(field.children().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    tag: Tag,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    attrs: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Element>,
}

impl Element {
    /// Create an element without attributes, text or children.
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attrs: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Create an element carrying a `name` attribute.
    pub fn named(tag: Tag, name: impl Into<String>) -> Self {
        Self::new(tag).with_attr(attr::NAME, name)
    }

    /// Create an `A` attribute element: `<A name="..">value</A>`.
    pub fn a(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::named(Tag::A, name).with_text(value)
    }

    /// Set an XML attribute, returning the element.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the text content, returning the element.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child, returning the element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children, returning the element.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the value of the XML attribute `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Returns all XML attributes in document order.
    pub fn attrs(&self) -> &IndexMap<String, String> {
        &self.attrs
    }

    /// Returns the `name` attribute.
    pub fn name(&self) -> Option<&str> {
        self.attr(attr::NAME)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }

    /// Iterate over the direct children tagged `tag`.
    pub fn children_tagged<'a>(&'a self, tag: &'a Tag) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.tag() == tag)
    }

    /// Returns the text of the `A` child named `name`.
    pub fn a_value(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .rev()
            .find(|child| child.tag == Tag::A && child.name() == Some(name))
            .and_then(Element::text)
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Remove an XML attribute, keeping the order of the others.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.shift_remove(name)
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text;
    }

    /// Returns the flag `name` if it is present and readable.
    pub fn explicit_flag(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(parse_flag)
    }

    /// Returns the flag `name`, falling back to the schema default for this
    /// element type.
    pub fn flag(&self, name: &str) -> bool {
        self.explicit_flag(name)
            .unwrap_or_else(|| default_flag(&self.tag, name))
    }

    /// Returns `false` only when `enabled` is explicitly false.
    pub fn is_enabled(&self) -> bool {
        self.flag(attr::ENABLED)
    }

    /// Decompose the element into its parts.
    pub fn into_parts(self) -> (Tag, IndexMap<String, String>, Option<String>, Vec<Element>) {
        (self.tag, self.attrs, self.text, self.children)
    }

    /// Reassemble an element from its parts.
    pub fn from_parts(
        tag: Tag,
        attrs: IndexMap<String, String>,
        text: Option<String>,
        children: Vec<Element>,
    ) -> Self {
        Self {
            tag,
            attrs,
            text,
            children,
        }
    }
}
