//! Labels attaching messages to model locations.
//!
//! Fragments arrive as parsed trees without source offsets, so a label points
//! at the identity [`Key`] of the element involved instead of a text span.

use crate::identity::Key;

/// A labeled model location.
///
/// - **Primary labels** mark the element the diagnostic is about.
/// - **Secondary labels** add context, such as the other half of a duplicate
///   or the layer that introduced a node.
#[derive(Debug, Clone)]
pub struct Label {
    key: Key,
    message: String,
    is_primary: bool,
}

impl Label {
    /// Create a new primary label.
    pub fn primary(key: Key, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
            is_primary: true,
        }
    }

    /// Create a new secondary label.
    pub fn secondary(key: Key, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
            is_primary: false,
        }
    }

    /// Get the key this label points at.
    pub fn key(&self) -> Key {
        self.key
    }

    /// Get the label message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a primary label.
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Check if this is a secondary label.
    pub fn is_secondary(&self) -> bool {
        !self.is_primary
    }
}
