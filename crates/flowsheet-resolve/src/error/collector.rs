//! Collector for accumulating diagnostics during a resolution pass.
//!
//! The [`DiagnosticCollector`] allows passes to report every problem they find
//! instead of stopping at the first one.

use crate::error::{Diagnostic, ResolveError};

/// A collector for accumulating diagnostics during a resolution pass.
///
/// Unlike a plain `Vec`, the collector tracks whether any error-severity
/// diagnostic was emitted and keeps warnings on both the success and failure
/// paths.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    has_errors: bool,
}

impl DiagnosticCollector {
    /// Create a new empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a diagnostic to this collector.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity().is_error() {
            self.has_errors = true;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Emit every diagnostic from an iterator.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.emit(diagnostic);
        }
    }

    /// Returns `true` if an error-severity diagnostic was emitted.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Finish collection and return a result.
    ///
    /// - If there are errors, returns `Err(ResolveError)` with all diagnostics.
    /// - Otherwise returns the warnings that were collected.
    pub fn finish(self) -> Result<Vec<Diagnostic>, ResolveError> {
        if self.has_errors {
            Err(ResolveError::new(self.diagnostics))
        } else {
            Ok(self.diagnostics)
        }
    }

    /// Consume the collector, returning everything it holds.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
