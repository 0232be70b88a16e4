//! Identifier management using string interning
//!
//! Names of fields, processes, streams and endpoints are compared constantly
//! while resolving a model. [`Id`] interns them once so that equality and
//! hashing are integer operations.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner shared by every [`Id`].
///
/// # Thread Safety
///
/// Access is serialized through a `Mutex`, so identifiers can be created from
/// the concurrent resolver passes.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

/// Run `f` with exclusive access to the global interner.
fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut interner)
}

/// Interned identifier
///
/// # Examples
///
/// ```
/// use flowsheet_core::identifier::Id;
///
/// let field = Id::new("R1");
/// let stream = field.nested("Stream[A => B]");
/// assert_eq!(stream, "R1/Stream[A => B]");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from a string slice, interning it on first use.
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// Creates an `Id` for a path segment below `self`, joined with `/`.
    pub fn nested(&self, segment: &str) -> Self {
        with_interner(|interner| {
            let parent = interner.resolve(self.0).unwrap_or_default().to_string();
            let joined = format!("{parent}/{segment}");
            Self(interner.get_or_intern(joined))
        })
    }

    /// Returns an owned copy of the interned string.
    pub fn as_string(&self) -> String {
        with_interner(|interner| interner.resolve(self.0).unwrap_or_default().to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:?})", self.as_string())
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for Id {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    /// Allows direct comparison with string slices: `id == "R1"`
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| interner.resolve(self.0) == Some(other))
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}
