//! # Flowsheet Resolve
//!
//! Resolution engine for layered flowsheet models. A model is assembled from
//! an ordered list of fragment trees; this crate merges them, validates the
//! result against the declared attribute schema and derives the per-field
//! process selections and stream graphs that numeric processing runs on.
//!
//! ## Usage
//!
//! ```
//! # use flowsheet_core::element::{Element, Tag, attr};
//! # use flowsheet_resolve::{ResolveConfig, error::ResolveError, resolve};
//!
//! fn main() -> Result<(), ResolveError> {
//!     let base = Element::new(Tag::Model).with_child(
//!         Element::named(Tag::Field, "R1")
//!             .with_child(Element::named(Tag::Process, "A"))
//!             .with_child(Element::named(Tag::Process, "B"))
//!             .with_child(
//!                 Element::new(Tag::Stream)
//!                     .with_attr(attr::SRC, "A")
//!                     .with_attr(attr::DST, "B"),
//!             ),
//!     );
//!
//!     let resolution = resolve(vec![base], &ResolveConfig::default())?;
//!     resolution.ensure_valid()?;
//!     assert_eq!(resolution.graph("R1").map(|graph| graph.edge_count()), Some(1));
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod choice;
pub mod error;
pub mod identity;
pub mod merge;
pub mod model;
pub mod registry;
pub mod stream_graph;
pub mod tables;

mod resolution;
mod validate;

pub use identity::Key;
pub use merge::ChoiceMergePolicy;
pub use resolution::Resolution;

use std::{panic, thread};

use indexmap::IndexMap;
use log::{debug, info, warn};

use flowsheet_core::element::Element;

use choice::ProcessSelection;
use error::{Diagnostic, DiagnosticCollector, ErrorCode, ResolveError, Severity};
use model::ResolvedModel;
use registry::AttributeRegistry;
use stream_graph::FieldGraph;

/// Options that steer a resolution run.
#[derive(Debug, Clone, Default)]
pub struct ResolveConfig {
    lenient: bool,
    choice_merge: ChoiceMergePolicy,
    analyses: Vec<String>,
    fields: Vec<String>,
}

impl ResolveConfig {
    /// Report unknown attributes as warnings instead of failing.
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_choice_merge(mut self, policy: ChoiceMergePolicy) -> Self {
        self.choice_merge = policy;
        self
    }

    /// Restrict downstream resolution to the fields of these analyses.
    pub fn with_analyses(mut self, analyses: Vec<String>) -> Self {
        self.analyses = analyses;
        self
    }

    /// Restrict downstream resolution to these fields.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn lenient(&self) -> bool {
        self.lenient
    }

    pub fn choice_merge(&self) -> ChoiceMergePolicy {
        self.choice_merge
    }

    pub fn analyses(&self) -> &[String] {
        &self.analyses
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Resolve an ordered list of fragments into a [`Resolution`].
///
/// The pipeline:
///
/// 1. **Merge** - Overlay fragments in order, then apply `modifies`
/// 2. **Load** - Read the attribute registry from the merged `AttrDefs`
/// 3. **Validate** - Check every enabled node against its class schema
/// 4. **Freeze** - Flatten the tree into an indexed [`ResolvedModel`]
/// 5. **Scope** - Resolve analyses and the configured run restriction
/// 6. **Derive** - Per in-scope field, resolve process choices and build the
///    stream graph, concurrently over the frozen model
///
/// # Errors
///
/// Returns a [`ResolveError`] for fatal conditions: invalid fragments,
/// duplicate identities, invalid attribute definitions, cyclic structures,
/// ambiguous choices, unknown run selections, and unknown attributes when not
/// lenient. Every other problem is collected on the returned
/// [`Resolution`], which is then flagged invalid.
pub fn resolve(
    fragments: Vec<Element>,
    config: &ResolveConfig,
) -> Result<Resolution, ResolveError> {
    info!(fragments = fragments.len(), lenient = config.lenient; "Resolving model");
    let mut collector = DiagnosticCollector::new();

    // Step 1: Merge
    let mut merged = merge::merge_fragments(fragments, config.choice_merge)?;
    collector.extend(merge::apply_modifies(&mut merged, config.choice_merge));
    let merge::Merged { model, provenance } = merged;

    // Step 2: Load
    let registry = AttributeRegistry::load(&model)?;

    // Step 3: Validate
    let unknown_severity = if config.lenient {
        Severity::Warning
    } else {
        Severity::Error
    };
    let validation = validate::validate_tree(&registry, &model, unknown_severity)?;
    let unknown_attribute = validation
        .iter()
        .any(|diag| diag.severity().is_error() && diag.code() == Some(ErrorCode::E200));
    collector.extend(validation);
    if unknown_attribute {
        return Err(ResolveError::new(collector.into_diagnostics()));
    }

    // Step 4: Freeze
    let model = ResolvedModel::freeze(model, &provenance)?;
    collector.extend(validate::missing_streams(&model));
    debug!(nodes = model.len(), schema_version = model.schema_version(); "Model frozen");

    // Step 5: Scope
    let mut scope_diagnostics = Vec::new();
    let analyses = analysis::scope_analyses(&model, &mut scope_diagnostics);
    collector.extend(scope_diagnostics);
    let restriction =
        analysis::run_restriction(&model, &analyses, &config.analyses, &config.fields)?;

    let in_scope: Vec<_> = model
        .fields()
        .filter(|field| field.is_enabled())
        .filter_map(|field| field.name().map(|name| (name, field.id())))
        .filter(|(name, _)| {
            restriction
                .as_ref()
                .is_none_or(|selected| selected.contains(*name))
        })
        .collect();
    info!(fields = in_scope.len(); "Fields in scope");

    // Step 6: Derive
    let derived = thread::scope(|scope| {
        let handles: Vec<_> = in_scope
            .iter()
            .map(|(name, field)| {
                let model = &model;
                let field = *field;
                let choices = scope.spawn(move || {
                    let mut diagnostics = Vec::new();
                    let selection = choice::resolve_field(model, field, &mut diagnostics);
                    (selection, diagnostics)
                });
                let graph = scope.spawn(move || {
                    let mut diagnostics = Vec::new();
                    let graph = stream_graph::build_field_graph(model, field, &mut diagnostics);
                    (graph, diagnostics)
                });
                (*name, choices, graph)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, choices, graph)| {
                let choices = choices.join().unwrap_or_else(|err| panic::resume_unwind(err));
                let graph = graph.join().unwrap_or_else(|err| panic::resume_unwind(err));
                (name, choices, graph)
            })
            .collect::<Vec<_>>()
    });

    let mut selections: IndexMap<String, ProcessSelection> = IndexMap::new();
    let mut graphs: IndexMap<String, FieldGraph> = IndexMap::new();
    let mut fatal: Vec<Diagnostic> = Vec::new();
    for (name, (selection, choice_diagnostics), (graph, graph_diagnostics)) in derived {
        collector.extend(choice_diagnostics);
        collector.extend(graph_diagnostics);
        match selection {
            Ok(selection) => {
                selections.insert(name.to_string(), selection);
            }
            Err(diag) => fatal.push(diag),
        }
        graphs.insert(name.to_string(), graph);
    }
    if !fatal.is_empty() {
        warn!(fields = fatal.len(); "Structural errors in process choices");
        let mut diagnostics = fatal;
        diagnostics.extend(collector.into_diagnostics());
        return Err(ResolveError::new(diagnostics));
    }

    let resolution = Resolution::new(
        model,
        registry,
        analyses,
        selections,
        graphs,
        collector.into_diagnostics(),
    );
    info!(
        valid = resolution.is_valid(),
        diagnostics = resolution.diagnostics().len();
        "Model resolved"
    );
    Ok(resolution)
}
