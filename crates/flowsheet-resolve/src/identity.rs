//! Identity keys for model elements.
//!
//! Every element of a fragment or of the merged model is addressed by a
//! [`Key`]: the path of `Tag[local-name]` segments from the `Model` root.
//! Equal keys in different fragments denote the same entity, which is what
//! lets the merge engine line layers up.
//!
//! Local names are explicit when the element carries a `name` attribute (or a
//! `name`/`phase` pair for components) and computed otherwise. Computed names
//! that repeat among siblings receive an ordinal suffix (`#2`, `#3`, ...);
//! repeated explicit names are a [`DuplicateIdentity`](ErrorCode::E101) error.

use std::{borrow::Cow, cmp::Ordering, collections::HashSet, fmt};

use flowsheet_core::{
    element::{Element, Tag, attr},
    identifier::Id,
};

use crate::error::{Diagnostic, ErrorCode, Result};

/// Identity of a model element.
///
/// A `Key` is an interned path such as `Model/Field[R1]/Stream[A => B]`, so
/// copying, hashing and comparing for equality are cheap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(Id);

impl Key {
    /// The key of the `Model` root element.
    pub fn root() -> Self {
        Self(Id::new(Tag::Model.as_str()))
    }

    /// Returns the key of a child element of type `tag` with local name
    /// `local`.
    ///
    /// An empty local name produces a bare `Tag` segment. The characters
    /// `\`, `[`, `]` and `/` in `local` are escaped with a backslash.
    ///
    /// ```
    /// use flowsheet_core::element::Tag;
    /// use flowsheet_resolve::Key;
    ///
    /// let stream = Key::root()
    ///     .child(&Tag::Field, "R1")
    ///     .child(&Tag::Stream, "A => B");
    /// assert_eq!(stream.to_string(), "Model/Field[R1]/Stream[A => B]");
    ///
    /// let defs = Key::root().child(&Tag::AttrDefs, "");
    /// assert_eq!(defs.to_string(), "Model/AttrDefs");
    /// ```
    pub fn child(&self, tag: &Tag, local: &str) -> Self {
        let segment = if local.is_empty() {
            tag.as_str().to_string()
        } else {
            format!("{tag}[{}]", escape_segment(local))
        };
        Self(self.0.nested(&segment))
    }

    /// Returns the interned path.
    pub fn id(&self) -> Id {
        self.0
    }

    /// Returns the path as an owned string.
    pub fn as_string(&self) -> String {
        self.0.as_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    /// Keys order by their path text.
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }
        self.as_string().cmp(&other.as_string())
    }
}

fn escape_segment(local: &str) -> Cow<'_, str> {
    const SPECIAL: [char; 4] = ['\\', '[', ']', '/'];
    if !local.contains(SPECIAL) {
        return Cow::Borrowed(local);
    }
    let mut escaped = String::with_capacity(local.len() + 2);
    for ch in local.chars() {
        if SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

/// The local part of an element's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalName {
    /// Declared by the element itself; must be unique among same-type siblings.
    Explicit(String),
    /// Derived from the element's content; repeats are disambiguated.
    Computed(String),
}

impl LocalName {
    /// Returns the name text.
    pub fn as_str(&self) -> &str {
        match self {
            LocalName::Explicit(name) | LocalName::Computed(name) => name,
        }
    }
}

/// Derive the local name of `element`.
///
/// | Element                      | Local name             | Kind     |
/// |------------------------------|------------------------|----------|
/// | `Component`                  | `name@phase`           | explicit |
/// | any with `name`              | `name`                 | explicit |
/// | `AttrDefs`                   | (empty, singleton)     | explicit |
/// | `Stream`                     | `src => dst`           | computed |
/// | `Cell`                       | `row,col`              | computed |
/// | `Group`, `Contains`, `Option`| trimmed text           | computed |
/// | anything else                | (empty)                | computed |
pub fn local_name(element: &Element) -> LocalName {
    let tag = element.tag();

    if let Some(name) = element.name() {
        return match (tag, element.attr(attr::PHASE)) {
            (Tag::Component, Some(phase)) => LocalName::Explicit(format!("{name}@{phase}")),
            _ => LocalName::Explicit(name.to_string()),
        };
    }

    match tag {
        Tag::AttrDefs => LocalName::Explicit(String::new()),
        Tag::Stream => LocalName::Computed(stream_name(element)),
        Tag::Cell => LocalName::Computed(format!(
            "{},{}",
            element.attr(attr::ROW).unwrap_or_default(),
            element.attr(attr::COL).unwrap_or_default()
        )),
        Tag::Group | Tag::Contains | Tag::Option => {
            LocalName::Computed(element.text().unwrap_or_default().trim().to_string())
        }
        _ => LocalName::Computed(String::new()),
    }
}

/// Returns the display name of a stream: its `name` attribute, or
/// `"src => dst"` when unnamed.
pub fn stream_name(element: &Element) -> String {
    match element.name() {
        Some(name) => name.to_string(),
        None => format!(
            "{} => {}",
            element.attr(attr::SRC).unwrap_or_default(),
            element.attr(attr::DST).unwrap_or_default()
        ),
    }
}

/// Returns the base identity of `element` under `parent`, without sibling
/// disambiguation.
pub fn identity_of(parent: Key, element: &Element) -> Key {
    parent.child(element.tag(), local_name(element).as_str())
}

/// Assign keys to a list of siblings under `parent`.
///
/// Explicit names are assigned first so that computed names step around
/// them. The returned keys are parallel to `children`.
///
/// # Errors
///
/// Returns an [`E101`](ErrorCode::E101) diagnostic when two siblings of the
/// same type share an explicit name.
pub fn child_keys(parent: Key, children: &[Element]) -> Result<Vec<Key>> {
    let names: Vec<LocalName> = children.iter().map(local_name).collect();
    let mut keys: Vec<Option<Key>> = vec![None; children.len()];
    let mut used: HashSet<Key> = HashSet::with_capacity(children.len());

    for (index, (child, name)) in children.iter().zip(&names).enumerate() {
        let LocalName::Explicit(name) = name else {
            continue;
        };
        let key = parent.child(child.tag(), name);
        if !used.insert(key) {
            return Err(duplicate_identity(parent, child.tag(), name, key));
        }
        keys[index] = Some(key);
    }

    for (index, (child, name)) in children.iter().zip(&names).enumerate() {
        let LocalName::Computed(name) = name else {
            continue;
        };
        let mut key = parent.child(child.tag(), name);
        let mut ordinal = 1;
        while used.contains(&key) {
            ordinal += 1;
            key = parent.child(child.tag(), &format!("{name}#{ordinal}"));
        }
        used.insert(key);
        keys[index] = Some(key);
    }

    Ok(keys.into_iter().flatten().collect())
}

/// Check every sibling list of a fragment tree for duplicate identities.
pub fn check_identities(root: &Element) -> Result<()> {
    fn walk(key: Key, element: &Element) -> Result<()> {
        let keys = child_keys(key, element.children())?;
        for (child_key, child) in keys.into_iter().zip(element.children()) {
            walk(child_key, child)?;
        }
        Ok(())
    }

    walk(Key::root(), root)
}

fn duplicate_identity(parent: Key, tag: &Tag, name: &str, key: Key) -> Diagnostic {
    Diagnostic::error(format!("{tag} `{name}` is defined more than once under `{parent}`"))
        .with_code(ErrorCode::E101)
        .with_label(key, "duplicate definition")
        .with_secondary_label(parent, "within this element")
        .with_help(format!(
            "sibling {tag} elements must have distinct names within one fragment"
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(src: &str, dst: &str) -> Element {
        Element::new(Tag::Stream)
            .with_attr(attr::SRC, src)
            .with_attr(attr::DST, dst)
    }

    #[test]
    fn test_key_paths() {
        let field = Key::root().child(&Tag::Field, "R1");
        assert_eq!(field.to_string(), "Model/Field[R1]");
        assert_eq!(format!("{field:?}"), "Key(Model/Field[R1])");
        assert_eq!(field, Key::root().child(&Tag::Field, "R1"));
        assert_ne!(field, Key::root().child(&Tag::Process, "R1"));
    }

    #[test]
    fn test_key_segments_are_escaped() {
        let tricky = Key::root().child(&Tag::Field, "R1]/Stream[A");
        let nested = Key::root().child(&Tag::Field, "R1").child(&Tag::Stream, "A");

        assert_ne!(tricky, nested);
        assert_eq!(tricky.to_string(), r"Model/Field[R1\]\/Stream\[A]");
        assert_eq!(
            Key::root().child(&Tag::Field, r"a\b").to_string(),
            r"Model/Field[a\\b]"
        );
    }

    #[test]
    fn test_local_names() {
        assert_eq!(
            local_name(&Element::named(Tag::Field, "R1")),
            LocalName::Explicit("R1".to_string())
        );
        assert_eq!(
            local_name(&stream("A", "B")),
            LocalName::Computed("A => B".to_string())
        );
        assert_eq!(
            local_name(
                &Element::named(Tag::Component, "oil").with_attr(attr::PHASE, "liquid")
            ),
            LocalName::Explicit("oil@liquid".to_string())
        );
        assert_eq!(
            local_name(
                &Element::new(Tag::Cell)
                    .with_attr(attr::ROW, "2020")
                    .with_attr(attr::COL, "gas")
            ),
            LocalName::Computed("2020,gas".to_string())
        );
        assert_eq!(
            local_name(&Element::new(Tag::Group).with_text(" offshore ")),
            LocalName::Computed("offshore".to_string())
        );
        assert_eq!(
            local_name(&Element::new(Tag::AttrDefs)),
            LocalName::Explicit(String::new())
        );
    }

    #[test]
    fn test_computed_keys_get_ordinals() {
        let parent = Key::root().child(&Tag::Field, "R1");
        let keys = child_keys(parent, &[stream("A", "B"), stream("A", "B"), stream("A", "B")])
            .expect("computed names never collide fatally");

        assert_eq!(keys[0].to_string(), "Model/Field[R1]/Stream[A => B]");
        assert_eq!(keys[1].to_string(), "Model/Field[R1]/Stream[A => B#2]");
        assert_eq!(keys[2].to_string(), "Model/Field[R1]/Stream[A => B#3]");
    }

    #[test]
    fn test_computed_steps_around_explicit() {
        let parent = Key::root().child(&Tag::Field, "R1");
        let keys = child_keys(
            parent,
            &[stream("A", "B"), Element::named(Tag::Stream, "A => B")],
        )
        .expect("no explicit duplicates");

        assert_eq!(keys[1].to_string(), "Model/Field[R1]/Stream[A => B]");
        assert_eq!(keys[0].to_string(), "Model/Field[R1]/Stream[A => B#2]");
    }

    #[test]
    fn test_same_name_different_type_is_fine() {
        let keys = child_keys(
            Key::root(),
            &[
                Element::named(Tag::Field, "X"),
                Element::named(Tag::Analysis, "X"),
            ],
        )
        .expect("types differ");
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_duplicate_explicit_name() {
        let err = child_keys(
            Key::root(),
            &[
                Element::named(Tag::Field, "R1"),
                Element::named(Tag::Field, "R1"),
            ],
        )
        .expect_err("duplicate field");

        assert_eq!(err.code(), Some(ErrorCode::E101));
        assert_eq!(
            err.primary_key(),
            Some(Key::root().child(&Tag::Field, "R1"))
        );
    }

    #[test]
    fn test_check_identities_nested() {
        let fragment = Element::new(Tag::Model).with_child(
            Element::named(Tag::Field, "R1")
                .with_child(Element::named(Tag::Process, "P"))
                .with_child(Element::named(Tag::Process, "P")),
        );

        let err = check_identities(&fragment).expect_err("nested duplicate");
        assert_eq!(
            err.primary_key().map(|key| key.to_string()),
            Some("Model/Field[R1]/Process[P]".to_string())
        );
    }

    #[test]
    fn test_key_ordering_by_path() {
        let a = Key::root().child(&Tag::Field, "A");
        let b = Key::root().child(&Tag::Field, "B");
        let mut keys = vec![b, a];
        keys.sort();
        assert_eq!(keys, vec![a, b]);
    }
}
