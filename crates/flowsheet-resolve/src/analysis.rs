//! Analysis scoping and run restriction.
//!
//! An `Analysis` selects model-level fields either by name or through `Group`
//! selectors matched against the fields' own `Group` membership tags.

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use regex::Regex;

use flowsheet_core::element::{Tag, attr};

use crate::{
    Key,
    error::{Diagnostic, ErrorCode, ResolveError},
    model::{Node, ResolvedModel},
};

/// The fields selected by one `Analysis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisScope {
    name: String,
    key: Key,
    fields: Vec<String>,
}

impl AnalysisScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Field names, explicit references first, then group matches.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|name| name == field)
    }
}

enum Selector {
    Literal(String),
    Pattern(Regex),
}

impl Selector {
    fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == tag,
            Self::Pattern(regex) => regex.is_match(tag),
        }
    }
}

fn membership_tags<'a>(model: &'a ResolvedModel, field: &'a Node) -> Vec<&'a str> {
    model
        .children_tagged(field.id(), Tag::Group)
        .filter_map(|group| group.text().map(str::trim))
        .filter(|text| !text.is_empty())
        .collect()
}

fn selector(group: &Node, diagnostics: &mut Vec<Diagnostic>) -> Option<Selector> {
    let text = group.text().map(str::trim).unwrap_or_default();
    if !group.flag(attr::REGEX) {
        return Some(Selector::Literal(text.to_string()));
    }

    match Regex::new(&format!("^(?:{text})$")) {
        Ok(regex) => Some(Selector::Pattern(regex)),
        Err(err) => {
            diagnostics.push(
                Diagnostic::error(format!("invalid group pattern `{text}`"))
                    .with_code(ErrorCode::E303)
                    .with_label(group.key(), err.to_string()),
            );
            None
        }
    }
}

/// Resolve every `Analysis` of the model to the fields it selects.
///
/// Dangling field references ([`E301`](ErrorCode::E301)) and invalid group
/// patterns ([`E303`](ErrorCode::E303)) are collected; the offending selector
/// contributes nothing.
pub fn scope_analyses(
    model: &ResolvedModel,
    diagnostics: &mut Vec<Diagnostic>,
) -> IndexMap<String, AnalysisScope> {
    let fields: Vec<(&str, Vec<&str>)> = model
        .fields()
        .filter_map(|field| {
            field
                .name()
                .map(|name| (name, membership_tags(model, field)))
        })
        .collect();

    let mut scopes = IndexMap::new();
    for analysis in model.analyses() {
        let name = analysis.name().unwrap_or_default().to_string();
        let mut selected: IndexSet<String> = IndexSet::new();

        for reference in model.children_tagged(analysis.id(), Tag::Field) {
            let Some(target) = reference.name() else {
                continue;
            };
            if fields.iter().any(|(field, _)| *field == target) {
                selected.insert(target.to_string());
            } else {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "analysis `{name}` references unknown field `{target}`"
                    ))
                    .with_code(ErrorCode::E301)
                    .with_label(reference.key(), "no model-level field has this name")
                    .with_secondary_label(analysis.key(), "in this analysis"),
                );
            }
        }

        for group in model.children_tagged(analysis.id(), Tag::Group) {
            let Some(selector) = selector(group, diagnostics) else {
                continue;
            };
            for (field, tags) in &fields {
                if tags.iter().any(|tag| selector.matches(tag)) {
                    trace!(analysis:% = name, field:% = field; "Group selector matched");
                    selected.insert(field.to_string());
                }
            }
        }

        debug!(analysis:% = name, fields = selected.len(); "Analysis scoped");
        scopes.insert(
            name.clone(),
            AnalysisScope {
                name,
                key: analysis.key(),
                fields: selected.into_iter().collect(),
            },
        );
    }
    scopes
}

/// Compute the set of fields a run is restricted to.
///
/// Returns `None` when neither list names anything, meaning every field is in
/// scope. Unknown names fail with [`E304`](ErrorCode::E304).
pub fn run_restriction(
    model: &ResolvedModel,
    scopes: &IndexMap<String, AnalysisScope>,
    analyses: &[String],
    fields: &[String],
) -> Result<Option<IndexSet<String>>, ResolveError> {
    if analyses.is_empty() && fields.is_empty() {
        return Ok(None);
    }

    let mut unknown = Vec::new();
    let mut selected = IndexSet::new();

    for name in analyses {
        match scopes.get(name) {
            Some(scope) => selected.extend(scope.fields().iter().cloned()),
            None => unknown.push(
                Diagnostic::error(format!("unknown analysis `{name}`"))
                    .with_code(ErrorCode::E304)
                    .with_help("check the `analyses` run restriction"),
            ),
        }
    }
    for name in fields {
        if model.field(name).is_some() {
            selected.insert(name.clone());
        } else {
            unknown.push(
                Diagnostic::error(format!("unknown field `{name}`"))
                    .with_code(ErrorCode::E304)
                    .with_help("check the `fields` run restriction"),
            );
        }
    }

    if unknown.is_empty() {
        Ok(Some(selected))
    } else {
        Err(ResolveError::new(unknown))
    }
}

#[cfg(test)]
mod tests {
    use flowsheet_core::element::Element;

    use super::*;

    fn group(text: &str) -> Element {
        Element::new(Tag::Group).with_text(text)
    }

    fn model() -> ResolvedModel {
        let element = Element::new(Tag::Model)
            .with_child(Element::named(Tag::Field, "North-1").with_child(group("North")))
            .with_child(Element::named(Tag::Field, "North-2").with_child(group("North")))
            .with_child(Element::named(Tag::Field, "South-1").with_child(group("South")))
            .with_child(Element::named(Tag::Field, "Offshore").with_child(group("Sea")))
            .with_child(
                Element::named(Tag::Analysis, "north")
                    .with_child(Element::named(Tag::Field, "Offshore"))
                    .with_child(group("North")),
            )
            .with_child(
                Element::named(Tag::Analysis, "pattern")
                    .with_child(group("(North|South)").with_attr(attr::REGEX, "true")),
            )
            .with_child(
                Element::named(Tag::Analysis, "broken")
                    .with_child(Element::named(Tag::Field, "Nowhere"))
                    .with_child(group("(").with_attr(attr::REGEX, "true"))
                    .with_child(group("Sea")),
            );
        ResolvedModel::freeze(element, &IndexMap::new()).expect("freeze")
    }

    #[test]
    fn test_explicit_then_literal_group() {
        let model = model();
        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);

        assert_eq!(
            scopes["north"].fields(),
            ["Offshore", "North-1", "North-2"]
        );
    }

    #[test]
    fn test_regex_group_is_anchored() {
        let model = model();
        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);

        assert_eq!(
            scopes["pattern"].fields(),
            ["North-1", "North-2", "South-1"]
        );
        assert!(!scopes["pattern"].contains("Offshore"));
    }

    #[test]
    fn test_literal_group_does_not_interpret_pattern() {
        let element = Element::new(Tag::Model)
            .with_child(Element::named(Tag::Field, "F").with_child(group("North")))
            .with_child(Element::named(Tag::Analysis, "a").with_child(group("Nor.*")));
        let model = ResolvedModel::freeze(element, &IndexMap::new()).expect("freeze");

        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);
        assert!(scopes["a"].fields().is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_broken_selectors_are_collected() {
        let model = model();
        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);

        let codes: Vec<_> = diags.iter().filter_map(Diagnostic::code).collect();
        assert_eq!(codes, [ErrorCode::E301, ErrorCode::E303]);
        assert_eq!(scopes["broken"].fields(), ["Offshore"]);
    }

    #[test]
    fn test_run_restriction_union() {
        let model = model();
        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);

        assert_eq!(run_restriction(&model, &scopes, &[], &[]).expect("ok"), None);

        let restriction = run_restriction(
            &model,
            &scopes,
            &["north".to_string()],
            &["South-1".to_string()],
        )
        .expect("ok")
        .expect("restricted");
        let names: Vec<&str> = restriction.iter().map(String::as_str).collect();
        assert_eq!(names, ["Offshore", "North-1", "North-2", "South-1"]);
    }

    #[test]
    fn test_run_restriction_unknown_names() {
        let model = model();
        let mut diags = Vec::new();
        let scopes = scope_analyses(&model, &mut diags);

        let err = run_restriction(
            &model,
            &scopes,
            &["missing".to_string()],
            &["Nowhere".to_string()],
        )
        .expect_err("unknown names");
        assert_eq!(err.diagnostics().len(), 2);
        assert!(
            err.diagnostics()
                .iter()
                .all(|diag| diag.code() == Some(ErrorCode::E304))
        );
    }
}
