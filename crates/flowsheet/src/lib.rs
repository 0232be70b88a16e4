//! Flowsheet - layered model resolution for process flowsheets.
//!
//! A flowsheet model is assembled from an ordered list of fragments: a base
//! document followed by overlays that extend, replace or delete parts of it.
//! This crate runs the whole pipeline: merging, schema validation, process
//! choice resolution, stream graph construction and table patching.

pub mod config;
pub mod fragment;

mod error;

pub use flowsheet_core::{element, identifier};
pub use flowsheet_resolve::{
    ChoiceMergePolicy, Key, Resolution, analysis, choice, model, registry, stream_graph, tables,
};

pub use error::FlowsheetError;

/// The diagnostic system of the resolution engine.
pub mod diagnostics {
    pub use flowsheet_resolve::error::{
        Diagnostic, ErrorCode, Label, ResolveError, Severity,
    };
}

use log::{debug, info, warn};

use flowsheet_core::element::Element;

use config::AppConfig;
use diagnostics::{Diagnostic, ResolveError};
use tables::TableSet;

/// Builder for resolving flowsheet models.
///
/// # Examples
///
/// ```rust
/// use flowsheet::{ModelBuilder, config::AppConfig};
/// use flowsheet::element::{Element, Tag, attr};
///
/// let base = Element::new(Tag::Model).with_child(
///     Element::named(Tag::Field, "R1").with_child(
///         Element::new(Tag::Stream)
///             .with_attr(attr::SRC, "Well")
///             .with_attr(attr::DST, "Separator"),
///     ),
/// );
///
/// let builder = ModelBuilder::new(AppConfig::default());
/// let session = builder.build(vec![base]).expect("Failed to resolve");
/// assert!(session.is_valid());
///
/// // Or use default config
/// let builder = ModelBuilder::default();
/// ```
#[derive(Default)]
pub struct ModelBuilder {
    config: AppConfig,
    tables: Option<TableSet>,
}

impl ModelBuilder {
    /// Create a new model builder with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Application configuration including resolution and table settings
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            tables: None,
        }
    }

    /// Use `tables` as the starting tables instead of empty tables named by
    /// the configuration.
    pub fn with_tables(mut self, tables: TableSet) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Returns the configuration of this builder.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Resolve `fragments`, in layer order, and apply the model's table
    /// updates.
    ///
    /// # Errors
    ///
    /// Returns `FlowsheetError::Resolve` for fatal resolution problems such
    /// as duplicate identities, cyclic structures or ambiguous choices.
    /// Problems that do not stop resolution are recorded on the returned
    /// [`Session`] instead.
    pub fn build(&self, fragments: Vec<Element>) -> Result<Session, FlowsheetError> {
        info!(fragments = fragments.len(); "Building model");

        let resolve_config = self.config.resolve().to_resolve_config();
        let resolution = flowsheet_resolve::resolve(fragments, &resolve_config)?;
        debug!(fields = resolution.selections().len(); "Resolution finished");

        let mut tables = self
            .tables
            .clone()
            .unwrap_or_else(|| TableSet::with_known(self.config.tables().known()));
        let table_diagnostics = tables.apply_updates(resolution.model());
        if !table_diagnostics.is_empty() {
            warn!(skipped = table_diagnostics.len(); "Some table updates were skipped");
        }

        let mut diagnostics = resolution.diagnostics().to_vec();
        diagnostics.extend(table_diagnostics);

        let session = Session {
            resolution,
            tables,
            diagnostics,
        };
        info!(valid = session.is_valid(); "Model built");
        Ok(session)
    }
}

/// One resolved model together with its patched tables.
#[derive(Debug)]
pub struct Session {
    resolution: Resolution,
    tables: TableSet,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// All diagnostics of the session: resolution first, then table updates.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns `true` if no error was recorded.
    pub fn is_valid(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|diag| diag.severity().is_error())
    }

    /// Gate for numeric processing: fails with every recorded error.
    pub fn ensure_valid(&self) -> Result<(), FlowsheetError> {
        let errors: Vec<Diagnostic> = self
            .diagnostics
            .iter()
            .filter(|diag| diag.severity().is_error())
            .cloned()
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::new(errors).into())
        }
    }
}
