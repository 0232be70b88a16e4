//! Error adapter for converting FlowsheetError to miette diagnostics.
//!
//! This module provides the bridge between the library's error types and
//! miette's rich diagnostic formatting used in the CLI.
//!
//! Resolution diagnostics point at identity keys rather than source text.
//! Each diagnostic is rendered against a synthetic source that lists the
//! keys its labels refer to, one per line, so labels underline key paths.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, Severity as MietteSeverity, SourceSpan};

use flowsheet::{
    FlowsheetError,
    diagnostics::{Diagnostic, Severity},
};

/// Adapter for a single resolution diagnostic.
pub struct DiagnosticAdapter<'a> {
    /// The wrapped diagnostic
    diag: &'a Diagnostic,
    /// Key listing the labels point into
    src: String,
    /// Span of each label within `src`, parallel to the labels
    spans: Vec<SourceSpan>,
}

impl<'a> DiagnosticAdapter<'a> {
    /// Create a new diagnostic adapter.
    pub fn new(diag: &'a Diagnostic) -> Self {
        let mut src = String::new();
        let mut listed: Vec<(String, SourceSpan)> = Vec::new();
        let mut spans = Vec::with_capacity(diag.labels().len());

        for label in diag.labels() {
            let path = label.key().as_string();
            let span = match listed.iter().find(|(listed, _)| *listed == path) {
                Some((_, span)) => *span,
                None => {
                    let span = SourceSpan::new(src.len().into(), path.len());
                    src.push_str(&path);
                    src.push('\n');
                    listed.push((path, span));
                    span
                }
            };
            spans.push(span);
        }

        Self { diag, src, spans }
    }

    /// Returns the synthetic source listing.
    pub fn source(&self) -> &str {
        &self.src
    }
}

impl fmt::Debug for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticAdapter")
            .field("diag", &self.diag)
            .finish()
    }
}

impl fmt::Display for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diag.message())
    }
}

impl std::error::Error for DiagnosticAdapter<'_> {}

impl MietteDiagnostic for DiagnosticAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .code()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<MietteSeverity> {
        Some(match self.diag.severity() {
            Severity::Error => MietteSeverity::Error,
            Severity::Warning => MietteSeverity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .help()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        if self.src.is_empty() {
            return None;
        }
        Some(&self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = self.diag.labels();
        if labels.is_empty() {
            return None;
        }

        Some(Box::new(labels.iter().zip(&self.spans).map(|(label, span)| {
            let message = Some(label.message().to_string());
            if label.is_primary() {
                LabeledSpan::new_primary_with_span(message, *span)
            } else {
                LabeledSpan::new_with_span(message, *span)
            }
        })))
    }
}

/// Adapter for non-diagnostic [`FlowsheetError`] variants.
///
/// This adapter handles errors that carry no identity labels, such as I/O,
/// fragment encoding and decoding, and configuration errors.
pub struct ErrorAdapter<'a>(pub &'a FlowsheetError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            FlowsheetError::Io(_) => "flowsheet::io",
            FlowsheetError::Decode { .. } => "flowsheet::decode",
            FlowsheetError::Encode { .. } => "flowsheet::encode",
            FlowsheetError::Config(_) => "flowsheet::config",
            FlowsheetError::Resolve(_) => return None,
        };
        Some(Box::new(code))
    }
}

/// A reportable error that can be rendered by miette.
#[derive(Debug)]
pub enum Reportable<'a> {
    /// A resolution diagnostic with key labels.
    Diagnostic(DiagnosticAdapter<'a>),
    /// A simple error without labels.
    Error(ErrorAdapter<'a>),
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Diagnostic(d) => fmt::Display::fmt(d, f),
            Reportable::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Diagnostic(_) => None,
            Reportable::Error(e) => e.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.code(),
            Reportable::Error(e) => e.code(),
        }
    }

    fn severity(&self) -> Option<MietteSeverity> {
        match self {
            Reportable::Diagnostic(d) => d.severity(),
            Reportable::Error(e) => e.severity(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.help(),
            Reportable::Error(e) => e.help(),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            Reportable::Diagnostic(d) => d.source_code(),
            Reportable::Error(e) => e.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            Reportable::Diagnostic(d) => d.labels(),
            Reportable::Error(e) => e.labels(),
        }
    }
}

/// Wrap each diagnostic in a [`Reportable`].
pub fn diagnostics_to_reportables(diagnostics: &[Diagnostic]) -> Vec<Reportable<'_>> {
    diagnostics
        .iter()
        .map(|d| Reportable::Diagnostic(DiagnosticAdapter::new(d)))
        .collect()
}

/// Convert a [`FlowsheetError`] into a list of reportable errors.
///
/// For [`FlowsheetError::Resolve`], this returns one [`Reportable`] for
/// each diagnostic in the error. For other error variants, this returns a
/// single [`Reportable`].
pub fn to_reportables(err: &FlowsheetError) -> Vec<Reportable<'_>> {
    match err {
        FlowsheetError::Resolve(resolve_err) => {
            diagnostics_to_reportables(resolve_err.diagnostics())
        }
        _ => vec![Reportable::Error(ErrorAdapter(err))],
    }
}

#[cfg(test)]
mod tests {
    use flowsheet::{
        Key,
        diagnostics::{ErrorCode, ResolveError},
        element::Tag,
    };

    use super::*;

    fn field(name: &str) -> Key {
        Key::root().child(&Tag::Field, name)
    }

    #[test]
    fn test_single_diagnostic() {
        let diag = Diagnostic::error("test error")
            .with_code(ErrorCode::E300)
            .with_label(field("R1"), "here")
            .with_help("try this");
        let err = FlowsheetError::Resolve(ResolveError::from(diag));

        let reportables = to_reportables(&err);
        assert_eq!(reportables.len(), 1);

        match &reportables[0] {
            Reportable::Diagnostic(d) => {
                assert_eq!(d.to_string(), "test error");
                assert_eq!(d.source(), "Model/Field[R1]\n");
            }
            Reportable::Error(_) => panic!("Expected Diagnostic"),
        }
    }

    #[test]
    fn test_multiple_diagnostics() {
        let diags = vec![
            Diagnostic::error("first error").with_label(field("R1"), "first"),
            Diagnostic::warning("second error").with_label(field("R2"), "second"),
            Diagnostic::error("third error"),
        ];
        let err = FlowsheetError::Resolve(ResolveError::from(diags));

        let reportables = to_reportables(&err);

        assert_eq!(reportables.len(), 3);
        assert_eq!(reportables[0].to_string(), "first error");
        assert_eq!(reportables[1].severity(), Some(MietteSeverity::Warning));
        assert!(reportables[2].labels().is_none());
        assert!(reportables[2].source_code().is_none());
    }

    #[test]
    fn test_non_resolve_error() {
        let err = FlowsheetError::Config("bad key".to_string());

        let reportables = to_reportables(&err);

        assert_eq!(reportables.len(), 1);
        match &reportables[0] {
            Reportable::Error(e) => {
                assert_eq!(e.to_string(), "Configuration error: bad key");
                assert_eq!(
                    e.code().map(|code| code.to_string()),
                    Some("flowsheet::config".to_string())
                );
            }
            Reportable::Diagnostic(_) => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_labels_share_listed_keys() {
        let diag = Diagnostic::error("duplicate")
            .with_label(field("R1"), "primary label")
            .with_secondary_label(Key::root(), "parent")
            .with_secondary_label(field("R1"), "again");

        let adapter = DiagnosticAdapter::new(&diag);
        assert_eq!(adapter.source(), "Model/Field[R1]\nModel\n");

        let labels: Vec<_> = adapter.labels().expect("labels").collect();
        assert_eq!(labels.len(), 3);
        assert!(labels[0].primary());
        assert!(!labels[1].primary());
        assert_eq!(labels[0].offset(), labels[2].offset());
        assert_eq!(labels[1].offset(), "Model/Field[R1]\n".len());
        assert_eq!(labels[1].label(), Some("parent"));
    }
}
