//! Error codes for the resolution diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E1xx` - Structural errors (abort resolution)
//! - `E2xx` - Attribute constraint errors
//! - `E3xx` - Reference errors
//! - `E4xx` - Table and stream graph errors

use std::fmt;

/// Error codes for categorizing diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // Structural Errors (E1xx)
    // =========================================================================
    /// Invalid fragment.
    ///
    /// A fragment tree does not have a `Model` element at its root.
    E100,

    /// Duplicate identity.
    ///
    /// Two sibling elements of the same type carry the same explicit name
    /// within one fragment.
    E101,

    /// Cyclic structure.
    ///
    /// An `Aggregator` or `ProcessChoice` transitively contains itself
    /// through references.
    E102,

    /// Ambiguous choice.
    ///
    /// A `ProcessChoice` has several groups and no usable `default`.
    E103,

    /// Invalid attribute definition.
    ///
    /// An `AttrDef` has inconsistent or unreadable bounds, is declared twice
    /// in a class, or references undeclared `Options`.
    E104,

    // =========================================================================
    // Attribute Errors (E2xx)
    // =========================================================================
    /// Unknown attribute.
    ///
    /// The attribute is not declared for the node's class.
    E200,

    /// Value out of range.
    ///
    /// A numeric value violates a `GT`/`GE`/`LT`/`LE` bound.
    E201,

    /// Invalid option.
    ///
    /// The value is not one of the declared `Options`.
    E202,

    /// Exclusivity violation.
    ///
    /// More than one attribute of an exclusive group is true on one node.
    E203,

    /// Synchronization violation.
    ///
    /// Attributes of a synchronized group carry different values on one node.
    E204,

    /// Invalid value.
    ///
    /// The value cannot be read as the attribute's declared type.
    E205,

    // =========================================================================
    // Reference Errors (E3xx)
    // =========================================================================
    /// Dangling modify reference.
    ///
    /// The target named by `modifies` does not exist after all layers merged.
    E300,

    /// Dangling reference.
    ///
    /// A `ProcessRef`, `StreamRef` or analysis `Field` names nothing.
    E301,

    /// Field without streams.
    ///
    /// An enabled `Field` has no `Stream` after the final merge.
    E302,

    /// Invalid group pattern.
    ///
    /// A `Group` selector with `regex="true"` is not a valid pattern.
    E303,

    /// Unknown selection.
    ///
    /// The run restriction names an analysis or field that does not exist.
    E304,

    /// Unknown default group.
    ///
    /// A `ProcessChoice` default names a group it does not contain.
    E305,

    // =========================================================================
    // Table and Graph Errors (E4xx)
    // =========================================================================
    /// Unknown table.
    ///
    /// A `TableUpdate` names a table that is not known.
    E400,

    /// Dangling boundary stream.
    ///
    /// A boundary-tagged stream is isolated within its region.
    E401,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E101").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E103 => "E103",
            ErrorCode::E104 => "E104",
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
            ErrorCode::E300 => "E300",
            ErrorCode::E301 => "E301",
            ErrorCode::E302 => "E302",
            ErrorCode::E303 => "E303",
            ErrorCode::E304 => "E304",
            ErrorCode::E305 => "E305",
            ErrorCode::E400 => "E400",
            ErrorCode::E401 => "E401",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E100 => "invalid fragment",
            ErrorCode::E101 => "duplicate identity",
            ErrorCode::E102 => "cyclic structure",
            ErrorCode::E103 => "ambiguous choice",
            ErrorCode::E104 => "invalid attribute definition",
            ErrorCode::E200 => "unknown attribute",
            ErrorCode::E201 => "value out of range",
            ErrorCode::E202 => "invalid option",
            ErrorCode::E203 => "exclusivity violation",
            ErrorCode::E204 => "synchronization violation",
            ErrorCode::E205 => "invalid value",
            ErrorCode::E300 => "dangling modify reference",
            ErrorCode::E301 => "dangling reference",
            ErrorCode::E302 => "field without streams",
            ErrorCode::E303 => "invalid group pattern",
            ErrorCode::E304 => "unknown selection",
            ErrorCode::E305 => "unknown default group",
            ErrorCode::E400 => "unknown table",
            ErrorCode::E401 => "dangling boundary stream",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
