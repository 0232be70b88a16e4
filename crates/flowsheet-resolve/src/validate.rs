//! Attribute validation over the merged tree.

use log::{debug, trace};

use flowsheet_core::element::{Element, Tag};

use crate::{
    error::{Diagnostic, ErrorCode, Result, Severity},
    identity::{Key, child_keys},
    model::ResolvedModel,
    registry::AttributeRegistry,
};

/// Validate every enabled node of `model` against `registry`.
///
/// Disabled nodes and their subtrees are skipped. Unknown attributes are
/// reported with `unknown_severity`.
pub(crate) fn validate_tree(
    registry: &AttributeRegistry,
    model: &Element,
    unknown_severity: Severity,
) -> Result<Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    walk(registry, model, Key::root(), unknown_severity, &mut diagnostics)?;
    debug!(diagnostics = diagnostics.len(); "Validation pass finished");
    Ok(diagnostics)
}

fn walk(
    registry: &AttributeRegistry,
    element: &Element,
    key: Key,
    unknown_severity: Severity,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    if !element.is_enabled() {
        trace!(node:% = key; "Skipping disabled subtree");
        return Ok(());
    }

    let keys = child_keys(key, element.children())?;
    diagnostics.extend(registry.validate_node(element, key, &keys, unknown_severity));

    for (child_key, child) in keys.into_iter().zip(element.children()) {
        if *child.tag() != Tag::A {
            walk(registry, child, child_key, unknown_severity, diagnostics)?;
        }
    }
    Ok(())
}

/// Report enabled fields that have no streams left after merging.
pub(crate) fn missing_streams(model: &ResolvedModel) -> Vec<Diagnostic> {
    model
        .fields()
        .filter(|field| field.is_enabled())
        .filter(|field| model.children_tagged(field.id(), Tag::Stream).next().is_none())
        .map(|field| {
            Diagnostic::error(format!(
                "field `{}` has no streams",
                field.name().unwrap_or_default()
            ))
            .with_code(ErrorCode::E302)
            .with_label(field.key(), "declared here")
            .with_help("a field needs at least one `Stream` after all fragments are merged")
        })
        .collect()
}
