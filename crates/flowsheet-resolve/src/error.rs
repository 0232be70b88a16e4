//! Error and diagnostic system for model resolution.
//!
//! This module provides:
//! - Error codes for documentation and searchability
//! - Labels pointing at the identity [`Key`](crate::Key)s involved
//! - Severity levels
//! - A collector for accumulating diagnostics across a pass
//!
//! # Overview
//!
//! A [`Diagnostic`] is a single error or warning. Structural problems
//! (duplicate identities, cycles, ambiguous choices) abort resolution and are
//! returned as a [`ResolveError`]. Referential and constraint problems are
//! collected, resolution continues, and the finished model is flagged invalid.
//!
//! # Example
//!
//! ```
//! # use flowsheet_resolve::Key;
//! # use flowsheet_resolve::error::{Diagnostic, ErrorCode};
//! # use flowsheet_core::element::Tag;
//!
//! let first = Key::root().child(&Tag::Field, "R1");
//! let second = Key::root().child(&Tag::Field, "R2");
//!
//! let diag = Diagnostic::error("field `R2` modifies unknown field `R9`")
//!     .with_code(ErrorCode::E300)
//!     .with_label(second, "declared here")
//!     .with_secondary_label(first, "a sibling of the same type")
//!     .with_help("check the spelling of the `modifies` attribute");
//! ```

mod collector;
mod diagnostic;
mod error_code;
mod label;
mod resolve_error;
mod severity;

pub(crate) use collector::DiagnosticCollector;
pub(crate) use resolve_error::Result;

pub use diagnostic::Diagnostic;
pub use error_code::ErrorCode;
pub use label::Label;
pub use resolve_error::ResolveError;
pub use severity::Severity;
