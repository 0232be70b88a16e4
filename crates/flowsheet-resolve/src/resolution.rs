use indexmap::IndexMap;

use flowsheet_core::element::attr;

use crate::{
    Key,
    analysis::AnalysisScope,
    choice::ProcessSelection,
    error::{Diagnostic, ResolveError},
    model::ResolvedModel,
    registry::{AttrDef, AttributeRegistry},
    stream_graph::FieldGraph,
};

/// The outcome of one resolution run.
///
/// Holds the frozen model together with everything derived from it. A
/// resolution with error diagnostics is invalid and must not be handed to
/// numeric processing; see [`Resolution::ensure_valid`].
#[derive(Debug)]
pub struct Resolution {
    model: ResolvedModel,
    registry: AttributeRegistry,
    analyses: IndexMap<String, AnalysisScope>,
    selections: IndexMap<String, ProcessSelection>,
    graphs: IndexMap<String, FieldGraph>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub(crate) fn new(
        model: ResolvedModel,
        registry: AttributeRegistry,
        analyses: IndexMap<String, AnalysisScope>,
        selections: IndexMap<String, ProcessSelection>,
        graphs: IndexMap<String, FieldGraph>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            model,
            registry,
            analyses,
            selections,
            graphs,
            diagnostics,
        }
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn analyses(&self) -> &IndexMap<String, AnalysisScope> {
        &self.analyses
    }

    pub fn analysis(&self, name: &str) -> Option<&AnalysisScope> {
        self.analyses.get(name)
    }

    /// Process selections of the in-scope fields, in document order.
    pub fn selections(&self) -> &IndexMap<String, ProcessSelection> {
        &self.selections
    }

    pub fn selection(&self, field: &str) -> Option<&ProcessSelection> {
        self.selections.get(field)
    }

    /// Stream graphs of the in-scope fields, in document order.
    pub fn graphs(&self) -> &IndexMap<String, FieldGraph> {
        &self.graphs
    }

    pub fn graph(&self, field: &str) -> Option<&FieldGraph> {
        self.graphs.get(field)
    }

    /// All collected diagnostics, errors and warnings.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns `true` if no error was collected.
    pub fn is_valid(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|diag| diag.severity().is_error())
    }

    /// Fail with the collected errors if the resolution is invalid.
    pub fn ensure_valid(&self) -> Result<(), ResolveError> {
        let errors: Vec<Diagnostic> = self
            .diagnostics
            .iter()
            .filter(|diag| diag.severity().is_error())
            .cloned()
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::new(errors))
        }
    }

    /// Returns the value of attribute `name` on the node at `key`, falling
    /// back to the default declared for the node's class.
    pub fn attr_value(&self, key: Key, name: &str) -> Option<&str> {
        let node = self.model.get(key)?;
        self.model.a_value(node.id(), name).or_else(|| {
            let class = self.registry.class_for(node.tag(), node.attr(attr::CLASS));
            self.registry
                .class(class)
                .and_then(|schema| schema.get(name))
                .and_then(AttrDef::default)
        })
    }
}
