//! Layered merge of fragment trees.
//!
//! Fragments are applied in order onto an accumulating `Model` tree. Each
//! overlay element is matched against the accumulator by [`Key`] and handled
//! by exactly one [`OverrideAction`]. The accumulator is threaded through
//! [`MergeEngine::apply`] by value; nothing else observes it until
//! [`MergeEngine::finish`] hands it over.
//!
//! After all layers, [`apply_modifies`] turns every analysis field declared
//! with `modifies="X"` into a model-level copy of field `X`.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use flowsheet_core::element::{Element, Tag, attr};

use crate::{
    error::{Diagnostic, ErrorCode, Result},
    identity::{Key, check_identities, child_keys},
};

/// How an extending `ProcessChoice` treats its `ProcessGroup` children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChoiceMergePolicy {
    /// Groups merge by name like any other extended children.
    #[default]
    ByName,
    /// The overlay's groups replace the existing group set.
    Replace,
}

/// What a single overlay element does to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// Absent in the accumulator: add it.
    Insert,
    /// Present and `delete="true"`: remove the subtree.
    Delete,
    /// Present and `extend="true"`: merge attributes and children.
    Extend,
    /// Present without `extend`: replace the subtree.
    Replace,
    /// Absent and `delete="true"`: nothing to do.
    Skip,
}

impl OverrideAction {
    /// Resolve the action for `overlay` given whether its key already exists.
    pub fn resolve(overlay: &Element, exists: bool) -> Self {
        let delete = overlay.flag(attr::DELETE);
        match (exists, delete) {
            (true, true) => OverrideAction::Delete,
            (false, true) => OverrideAction::Skip,
            (false, false) => OverrideAction::Insert,
            (true, false) if overlay.flag(attr::EXTEND) => OverrideAction::Extend,
            (true, false) => OverrideAction::Replace,
        }
    }
}

/// The merged tree and the layer that last touched each key.
#[derive(Debug, Clone)]
pub struct Merged {
    pub model: Element,
    pub provenance: IndexMap<Key, usize>,
}

/// Applies fragments one layer at a time.
///
/// ```
/// use flowsheet_core::element::{Element, Tag};
/// use flowsheet_resolve::merge::{ChoiceMergePolicy, MergeEngine};
///
/// let base = Element::new(Tag::Model).with_child(Element::named(Tag::Field, "R1"));
/// let overlay = Element::new(Tag::Model)
///     .with_child(Element::named(Tag::Field, "R1").with_attr("delete", "true"));
///
/// let mut engine = MergeEngine::new(ChoiceMergePolicy::ByName);
/// let acc = engine.apply(Element::new(Tag::Model), base).unwrap();
/// let acc = engine.apply(acc, overlay).unwrap();
/// assert!(acc.children().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MergeEngine {
    policy: ChoiceMergePolicy,
    layer: usize,
    provenance: IndexMap<Key, usize>,
}

impl MergeEngine {
    pub fn new(policy: ChoiceMergePolicy) -> Self {
        Self {
            policy,
            layer: 0,
            provenance: IndexMap::new(),
        }
    }

    /// Overlay `fragment` onto `acc`, returning the new accumulator.
    ///
    /// # Errors
    ///
    /// - [`E100`](ErrorCode::E100) if the fragment root is not `Model`.
    /// - [`E101`](ErrorCode::E101) if the fragment repeats an explicit name
    ///   among siblings.
    pub fn apply(&mut self, mut acc: Element, fragment: Element) -> Result<Element> {
        let layer = self.layer;
        if *fragment.tag() != Tag::Model {
            return Err(Diagnostic::error(format!(
                "fragment {layer} has root element `{}`, expected `Model`",
                fragment.tag()
            ))
            .with_code(ErrorCode::E100)
            .with_label(Key::root(), "every fragment must be rooted here"));
        }
        check_identities(&fragment)?;

        debug!(layer, children = fragment.children().len(); "Merging fragment");
        self.merge_into(&mut acc, Key::root(), fragment)?;
        self.layer += 1;
        Ok(acc)
    }

    /// Returns the number of layers applied so far.
    pub fn layers(&self) -> usize {
        self.layer
    }

    /// Finish merging, keeping provenance only for keys still present.
    pub fn finish(self, model: Element) -> Result<Merged> {
        let mut live = Vec::new();
        collect_keys(Key::root(), &model, &mut live)?;
        let provenance = live
            .into_iter()
            .filter_map(|key| self.provenance.get(&key).map(|layer| (key, *layer)))
            .collect();
        Ok(Merged { model, provenance })
    }

    /// Extend `target` with `overlay`: overwrite attributes and text, then
    /// merge children by key.
    fn merge_into(&mut self, target: &mut Element, key: Key, overlay: Element) -> Result<()> {
        self.provenance.insert(key, self.layer);

        let (tag, attrs, text, children) = overlay.into_parts();
        for (name, value) in attrs {
            if name == attr::EXTEND || name == attr::DELETE {
                continue;
            }
            target.set_attr(name, value);
        }
        if text.is_some() {
            target.set_text(text);
        }

        if tag == Tag::ProcessChoice
            && self.policy == ChoiceMergePolicy::Replace
            && children.iter().any(|child| *child.tag() == Tag::ProcessGroup)
        {
            trace!(choice:% = key; "Replacing process group set");
            target
                .children_mut()
                .retain(|child| *child.tag() != Tag::ProcessGroup);
        }

        self.merge_children(target, key, children)
    }

    fn merge_children(&mut self, target: &mut Element, key: Key, overlay: Vec<Element>) -> Result<()> {
        let overlay = collapse_cells(overlay);
        let existing = std::mem::take(target.children_mut());
        let existing_keys = child_keys(key, &existing)?;
        let mut slots: IndexMap<Key, Element> = existing_keys.into_iter().zip(existing).collect();

        let overlay_keys = child_keys(key, &overlay)?;
        for (child_key, child) in overlay_keys.into_iter().zip(overlay) {
            let action = OverrideAction::resolve(&child, slots.contains_key(&child_key));
            trace!(key:% = child_key, action:?; "Override");
            match action {
                OverrideAction::Insert => {
                    let node = self.instantiate(child_key, child)?;
                    slots.insert(child_key, node);
                }
                OverrideAction::Delete => {
                    slots.shift_remove(&child_key);
                    debug!(key:% = child_key, layer = self.layer; "Deleted");
                }
                OverrideAction::Extend => {
                    if let Some(node) = slots.get_mut(&child_key) {
                        self.merge_into(node, child_key, child)?;
                    }
                }
                OverrideAction::Replace => {
                    let node = self.instantiate(child_key, child)?;
                    slots.insert(child_key, node);
                }
                OverrideAction::Skip => {
                    debug!(key:% = child_key, layer = self.layer; "Delete of absent element ignored");
                }
            }
        }

        *target.children_mut() = slots.into_values().collect();
        Ok(())
    }

    /// Build a fresh subtree from an overlay element.
    fn instantiate(&mut self, key: Key, overlay: Element) -> Result<Element> {
        let mut node = Element::new(overlay.tag().clone());
        self.merge_into(&mut node, key, overlay)?;
        Ok(node)
    }
}

/// Merge `fragments` in order into one `Model` tree.
///
/// The root `Model` element always extends: its attributes accumulate and
/// its children merge by key.
///
/// ```
/// use flowsheet_core::element::{Element, Tag};
/// use flowsheet_resolve::merge::{ChoiceMergePolicy, merge_fragments};
///
/// let base = Element::new(Tag::Model)
///     .with_child(Element::named(Tag::Field, "R1").with_child(Element::a("depth", "100")));
/// let overlay = Element::new(Tag::Model).with_child(
///     Element::named(Tag::Field, "R1")
///         .with_attr("extend", "true")
///         .with_child(Element::a("depth", "200")),
/// );
///
/// let merged = merge_fragments(vec![base, overlay], ChoiceMergePolicy::ByName).unwrap();
/// let field = &merged.model.children()[0];
/// assert_eq!(field.a_value("depth"), Some("200"));
/// assert_eq!(field.attr("extend"), None);
/// ```
pub fn merge_fragments(fragments: Vec<Element>, policy: ChoiceMergePolicy) -> Result<Merged> {
    let mut engine = MergeEngine::new(policy);
    let mut acc = Element::new(Tag::Model);
    for fragment in fragments {
        acc = engine.apply(acc, fragment)?;
    }
    info!(layers = engine.layers(); "Fragments merged");
    engine.finish(acc)
}

/// Expand every `Analysis/Field[modifies="X"]` into a model-level field.
///
/// The model-level `Field` named `X` is deep-copied, the source's attributes
/// are set on the copy and the source's children are merged into it by key,
/// exactly as a later layer would extend it. The copy is appended to the
/// model under the source's name. The source keeps only its attributes, is
/// marked `modified="true"`, and is skipped on later runs, so a second run
/// changes nothing.
///
/// Created keys take the layer of their source in `merged.provenance`.
///
/// Problems are collected and do not stop the pass:
/// - [`E300`](ErrorCode::E300) when no model-level field `X` exists;
/// - [`E101`](ErrorCode::E101) when a model-level field already has the
///   source's name.
pub fn apply_modifies(merged: &mut Merged, policy: ChoiceMergePolicy) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let sources: Vec<(usize, usize)> = merged
        .model
        .children()
        .iter()
        .enumerate()
        .filter(|(_, child)| *child.tag() == Tag::Analysis)
        .flat_map(|(analysis, child)| {
            child
                .children()
                .iter()
                .enumerate()
                .filter(|(_, field)| {
                    *field.tag() == Tag::Field && field.attr(attr::MODIFIES).is_some()
                })
                .map(move |(field, _)| (analysis, field))
        })
        .collect();

    for (analysis, field) in sources {
        if let Err(diag) = expand_modified_field(merged, policy, analysis, field) {
            diagnostics.push(diag);
        }
    }
    diagnostics
}

fn expand_modified_field(
    merged: &mut Merged,
    policy: ChoiceMergePolicy,
    analysis: usize,
    field: usize,
) -> Result<()> {
    let model = &mut merged.model;
    let analysis_key = child_keys(Key::root(), model.children())?[analysis];
    let source_key = child_keys(analysis_key, model.children()[analysis].children())?[field];

    let source = &model.children()[analysis].children()[field];
    if source.explicit_flag(attr::MODIFIED) == Some(true) {
        trace!(key:% = source_key; "Already modified");
        return Ok(());
    }
    let target_name = source.attr(attr::MODIFIES).unwrap_or_default().to_string();
    let new_name = source.name().unwrap_or_default().to_string();
    let new_key = Key::root().child(&Tag::Field, &new_name);

    let is_field =
        |child: &Element, name: &str| *child.tag() == Tag::Field && child.name() == Some(name);
    if model.children().iter().any(|child| is_field(child, new_name.as_str())) {
        return Err(Diagnostic::error(format!(
            "cannot copy field `{target_name}` to `{new_name}`: a field named `{new_name}` already exists"
        ))
        .with_code(ErrorCode::E101)
        .with_label(source_key, "declared here")
        .with_secondary_label(new_key, "existing field")
        .with_help("give the modified field a name not used by any model-level field"));
    }
    let Some(target) = model
        .children()
        .iter()
        .position(|child| is_field(child, target_name.as_str()))
    else {
        return Err(Diagnostic::error(format!(
            "field `{new_name}` modifies unknown field `{target_name}`"
        ))
        .with_code(ErrorCode::E300)
        .with_label(source_key, "declared here")
        .with_help("`modifies` must name a model-level Field present after all fragments are merged"));
    };

    let mut copy = model.children()[target].clone();
    let source = &mut model.children_mut()[analysis].children_mut()[field];
    source.set_attr(attr::MODIFIED, "true");
    let overlay = std::mem::take(source.children_mut());
    for (name, value) in source.attrs() {
        if name == attr::MODIFIES || name == attr::EXTEND || name == attr::DELETE {
            continue;
        }
        copy.set_attr(name.clone(), value.clone());
    }

    let layer = merged.provenance.get(&source_key).copied().unwrap_or_default();
    let mut engine = MergeEngine {
        policy,
        layer,
        provenance: std::mem::take(&mut merged.provenance),
    };
    let result = engine.merge_children(&mut copy, new_key, overlay);
    merged.provenance = engine.provenance;
    result?;

    let mut created = Vec::new();
    collect_keys(new_key, &copy, &mut created)?;
    for key in created {
        merged.provenance.entry(key).or_insert(layer);
    }
    merged.provenance.insert(new_key, layer);

    debug!(
        source:% = source_key, target = target_name.as_str(), field:% = new_key;
        "Modified field created"
    );
    merged.model.children_mut().push(copy);
    Ok(())
}

/// Unnamed `Cell`s repeating a (row, col) pair collapse to the last of them.
fn collapse_cells(children: Vec<Element>) -> Vec<Element> {
    fn position(child: &Element) -> Option<(&str, &str)> {
        if *child.tag() != Tag::Cell || child.name().is_some() {
            return None;
        }
        Some((
            child.attr(attr::ROW).unwrap_or_default(),
            child.attr(attr::COL).unwrap_or_default(),
        ))
    }

    let mut last: HashMap<(&str, &str), usize> = HashMap::new();
    for (index, child) in children.iter().enumerate() {
        if let Some(at) = position(child) {
            last.insert(at, index);
        }
    }
    if last.len() == children.iter().filter_map(position).count() {
        return children;
    }

    let keep: Vec<bool> = children
        .iter()
        .enumerate()
        .map(|(index, child)| position(child).is_none_or(|at| last.get(&at) == Some(&index)))
        .collect();
    trace!(dropped = keep.iter().filter(|kept| !**kept).count(); "Collapsing repeated cells");
    children
        .into_iter()
        .zip(keep)
        .filter_map(|(child, kept)| kept.then_some(child))
        .collect()
}

fn collect_keys(key: Key, element: &Element, out: &mut Vec<Key>) -> Result<()> {
    out.push(key);
    let keys = child_keys(key, element.children())?;
    for (child_key, child) in keys.into_iter().zip(element.children()) {
        collect_keys(child_key, child, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn model(children: impl IntoIterator<Item = Element>) -> Element {
        Element::new(Tag::Model).with_children(children)
    }

    fn field(name: &str) -> Element {
        Element::named(Tag::Field, name)
    }

    fn stream(src: &str, dst: &str) -> Element {
        Element::new(Tag::Stream)
            .with_attr(attr::SRC, src)
            .with_attr(attr::DST, dst)
    }

    fn merge(fragments: Vec<Element>) -> Element {
        merge_fragments(fragments, ChoiceMergePolicy::ByName)
            .expect("merge succeeds")
            .model
    }

    #[test]
    fn test_override_action_dispatch() {
        let plain = field("F");
        let extend = field("F").with_attr(attr::EXTEND, "true");
        let delete = field("F").with_attr(attr::DELETE, "true");

        assert_eq!(OverrideAction::resolve(&plain, false), OverrideAction::Insert);
        assert_eq!(OverrideAction::resolve(&plain, true), OverrideAction::Replace);
        assert_eq!(OverrideAction::resolve(&extend, true), OverrideAction::Extend);
        assert_eq!(OverrideAction::resolve(&extend, false), OverrideAction::Insert);
        assert_eq!(OverrideAction::resolve(&delete, true), OverrideAction::Delete);
        assert_eq!(OverrideAction::resolve(&delete, false), OverrideAction::Skip);
    }

    #[test]
    fn test_fragment_root_must_be_model() {
        let err = merge_fragments(vec![field("R1")], ChoiceMergePolicy::ByName)
            .expect_err("not a model");
        assert_eq!(err.code(), Some(ErrorCode::E100));
    }

    #[test]
    fn test_duplicate_identity_in_fragment() {
        let err = merge_fragments(
            vec![model([field("R1"), field("R1")])],
            ChoiceMergePolicy::ByName,
        )
        .expect_err("duplicate");
        assert_eq!(err.code(), Some(ErrorCode::E101));
    }

    #[test]
    fn test_extend_merges_children_and_attrs() {
        let base = model([field("R1")
            .with_attr("enabled", "true")
            .with_child(Element::a("depth", "100"))
            .with_child(stream("A", "B"))]);
        let overlay = model([field("R1")
            .with_attr(attr::EXTEND, "true")
            .with_attr("enabled", "false")
            .with_child(Element::a("age", "5"))
            .with_child(stream("B", "C").with_attr(attr::IMPUTE, "false"))]);

        let merged = merge(vec![base, overlay]);
        let r1 = &merged.children()[0];

        assert_eq!(r1.attr("enabled"), Some("false"));
        assert_eq!(r1.attr(attr::EXTEND), None);
        assert_eq!(r1.a_value("depth"), Some("100"));
        assert_eq!(r1.a_value("age"), Some("5"));
        assert_eq!(r1.children_tagged(&Tag::Stream).count(), 2);
    }

    #[test]
    fn test_replace_drops_old_children_in_place() {
        let base = model([
            field("R1").with_child(Element::a("depth", "100")),
            field("R2"),
        ]);
        let overlay = model([field("R1").with_child(Element::a("age", "5"))]);

        let merged = merge(vec![base, overlay]);
        let r1 = &merged.children()[0];
        assert_eq!(r1.name(), Some("R1"));
        assert_eq!(r1.a_value("depth"), None);
        assert_eq!(r1.a_value("age"), Some("5"));
        assert_eq!(merged.children()[1].name(), Some("R2"));
    }

    #[test]
    fn test_delete_absent_is_skipped() {
        let merged = merge(vec![model([field("R9").with_attr(attr::DELETE, "true")])]);
        assert!(merged.children().is_empty());
    }

    #[test]
    fn test_delete_then_reinsert_leaves_no_residue() {
        let base = model([field("R1")
            .with_attr("note", "old")
            .with_child(Element::a("depth", "100"))
            .with_child(stream("A", "B"))]);
        let delete = model([field("R1").with_attr(attr::DELETE, "true")]);
        let reinsert = model([field("R1")
            .with_attr(attr::EXTEND, "true")
            .with_child(stream("X", "Y"))]);

        let merged = merge(vec![base, delete, reinsert.clone()]);
        let fresh = merge(vec![reinsert]);
        assert_eq!(merged, fresh);
    }

    #[test]
    fn test_model_attributes_accumulate() {
        let base = model([]).with_attr(attr::SCHEMA_VERSION, "4.0.0.a");
        let overlay = model([]).with_attr("maximum_iterations", "20");

        let merged = merge(vec![base, overlay]);
        assert_eq!(merged.attr(attr::SCHEMA_VERSION), Some("4.0.0.a"));
        assert_eq!(merged.attr("maximum_iterations"), Some("20"));
    }

    #[test]
    fn test_choice_merge_policy() {
        let choice = |groups: &[&str]| {
            Element::named(Tag::ProcessChoice, "route").with_children(
                groups
                    .iter()
                    .map(|group| Element::named(Tag::ProcessGroup, *group)),
            )
        };
        let base = model([field("R1").with_child(choice(&["fast", "slow"]))]);
        let overlay = model([field("R1").with_attr(attr::EXTEND, "true").with_child(
            choice(&["medium"]).with_attr(attr::EXTEND, "true"),
        )]);

        let group_names = |policy| {
            let merged = merge_fragments(vec![base.clone(), overlay.clone()], policy)
                .expect("merge")
                .model;
            merged.children()[0].children()[0]
                .children()
                .iter()
                .filter_map(|group| group.name().map(str::to_string))
                .collect::<Vec<_>>()
        };

        assert_eq!(
            group_names(ChoiceMergePolicy::ByName),
            vec!["fast", "slow", "medium"]
        );
        assert_eq!(group_names(ChoiceMergePolicy::Replace), vec!["medium"]);
    }

    #[test]
    fn test_provenance_tracks_last_layer() {
        let base = model([field("R1"), field("R2")]);
        let overlay = model([field("R2").with_attr(attr::EXTEND, "true")]);

        let merged = merge_fragments(vec![base, overlay], ChoiceMergePolicy::ByName)
            .expect("merge");
        let r1 = Key::root().child(&Tag::Field, "R1");
        let r2 = Key::root().child(&Tag::Field, "R2");
        assert_eq!(merged.provenance.get(&r1), Some(&0));
        assert_eq!(merged.provenance.get(&r2), Some(&1));
        assert_eq!(merged.provenance.get(&Key::root()), Some(&1));
    }

    fn analysis(name: &str, fields: impl IntoIterator<Item = Element>) -> Element {
        Element::named(Tag::Analysis, name).with_children(fields)
    }

    fn merge_all(fragments: Vec<Element>) -> Merged {
        merge_fragments(fragments, ChoiceMergePolicy::ByName).expect("merge succeeds")
    }

    #[test]
    fn test_modifies_creates_field_copy() {
        let mut merged = merge_all(vec![model([
            field("base")
                .with_attr("label", "onshore")
                .with_child(Element::a("depth", "100"))
                .with_child(Element::a("age", "5"))
                .with_child(stream("A", "B")),
            analysis(
                "example",
                [field("variant")
                    .with_attr(attr::MODIFIES, "base")
                    .with_child(Element::a("depth", "250"))
                    .with_child(Element::a("wells", "8"))],
            ),
        ])]);

        let diags = apply_modifies(&mut merged, ChoiceMergePolicy::ByName);
        assert!(diags.is_empty(), "{diags:?}");

        let base = &merged.model.children()[0];
        assert_eq!(base.a_value("depth"), Some("100"));

        let variant = &merged.model.children()[2];
        assert_eq!(variant.name(), Some("variant"));
        assert_eq!(variant.attr("label"), Some("onshore"));
        assert_eq!(variant.attr(attr::MODIFIES), None);
        assert_eq!(variant.a_value("depth"), Some("250"));
        assert_eq!(variant.a_value("age"), Some("5"));
        assert_eq!(variant.a_value("wells"), Some("8"));
        assert_eq!(variant.children_tagged(&Tag::Stream).count(), 1);

        let source = &merged.model.children()[1].children()[0];
        assert_eq!(source.attr(attr::MODIFIED), Some("true"));
        assert!(source.children().is_empty());

        let variant_key = Key::root().child(&Tag::Field, "variant");
        assert_eq!(merged.provenance.get(&variant_key), Some(&0));

        let once = merged.model.clone();
        assert!(apply_modifies(&mut merged, ChoiceMergePolicy::ByName).is_empty());
        assert_eq!(merged.model, once);
    }

    #[test]
    fn test_modifies_takes_later_layer_provenance() {
        let mut merged = merge_all(vec![
            model([field("base").with_child(Element::a("depth", "100"))]),
            model([analysis(
                "example",
                [field("variant").with_attr(attr::MODIFIES, "base")],
            )]),
        ]);

        assert!(apply_modifies(&mut merged, ChoiceMergePolicy::ByName).is_empty());
        let depth = Key::root()
            .child(&Tag::Field, "variant")
            .child(&Tag::A, "depth");
        assert_eq!(merged.provenance.get(&depth), Some(&1));
    }

    #[test]
    fn test_dangling_modifies() {
        let mut merged = merge_all(vec![model([analysis(
            "example",
            [field("variant").with_attr(attr::MODIFIES, "nowhere")],
        )])]);

        let diags = apply_modifies(&mut merged, ChoiceMergePolicy::ByName);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), Some(ErrorCode::E300));
        assert_eq!(
            diags[0].primary_key().map(|key| key.to_string()),
            Some("Model/Analysis[example]/Field[variant]".to_string())
        );
        assert_eq!(merged.model.children().len(), 1);
        assert_eq!(merged.model.children()[0].children()[0].attr(attr::MODIFIED), None);
    }

    #[test]
    fn test_modifies_onto_existing_name() {
        let mut merged = merge_all(vec![model([
            field("base"),
            field("variant"),
            analysis("example", [field("variant").with_attr(attr::MODIFIES, "base")]),
        ])]);

        let diags = apply_modifies(&mut merged, ChoiceMergePolicy::ByName);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), Some(ErrorCode::E101));
        assert_eq!(merged.model.children().len(), 3);
    }

    #[test]
    fn test_repeated_cells_collapse_to_last() {
        let cell = |value: &str| {
            Element::new(Tag::Cell)
                .with_attr(attr::ROW, "r")
                .with_attr(attr::COL, "c")
                .with_text(value)
        };
        let base = model([Element::named(Tag::TableUpdate, "t")
            .with_child(cell("1"))
            .with_child(cell("2"))]);
        let overlay = model([Element::named(Tag::TableUpdate, "t")
            .with_attr(attr::EXTEND, "true")
            .with_child(cell("3"))]);

        let merged = merge(vec![base.clone()]);
        let update = &merged.children()[0];
        assert_eq!(update.children().len(), 1);
        assert_eq!(update.children()[0].text(), Some("2"));

        let merged = merge(vec![base, overlay]);
        let update = &merged.children()[0];
        assert_eq!(update.children().len(), 1);
        assert_eq!(update.children()[0].text(), Some("3"));
    }

    // Layers are drawn from a small vocabulary so that keys collide often.
    fn arb_a() -> impl Strategy<Value = Element> {
        (prop::sample::select(vec!["depth", "age", "wells"]), 0..100u32)
            .prop_map(|(name, value)| Element::a(name, value.to_string()))
    }

    fn arb_field() -> impl Strategy<Value = Element> {
        (
            prop::sample::select(vec!["R1", "R2", "R3"]),
            prop::sample::select(vec![None, Some(attr::EXTEND), Some(attr::DELETE)]),
            prop::collection::vec(arb_a(), 0..3),
            prop::collection::vec(
                (
                    prop::sample::select(vec!["A", "B"]),
                    prop::sample::select(vec!["C", "D"]),
                ),
                0..3,
            ),
        )
            .prop_map(|(name, control, attrs, streams)| {
                let mut element = field(name);
                if let Some(control) = control {
                    element.set_attr(control, "true");
                }
                let mut seen = std::collections::HashSet::new();
                for a in attrs {
                    if seen.insert(a.name().map(str::to_string)) {
                        element = element.with_child(a);
                    }
                }
                element.with_children(streams.into_iter().map(|(src, dst)| stream(src, dst)))
            })
    }

    fn arb_fragment() -> impl Strategy<Value = Element> {
        prop::collection::vec(arb_field(), 0..4).prop_map(|fields| {
            let mut seen = std::collections::HashSet::new();
            model(
                fields
                    .into_iter()
                    .filter(|field| seen.insert(field.name().map(str::to_string))),
            )
        })
    }

    fn check_layering_is_incremental(
        fragments: Vec<Element>,
    ) -> std::result::Result<(), TestCaseError> {
        let all_at_once = merge(fragments.clone());

        let mut engine = MergeEngine::new(ChoiceMergePolicy::ByName);
        let split = fragments.len() - 1;
        let mut acc = Element::new(Tag::Model);
        for fragment in fragments[..split].iter().cloned() {
            acc = engine.apply(acc, fragment).expect("prefix merges");
        }
        let prefix = engine.finish(acc).expect("prefix finishes").model;

        let mut engine = MergeEngine::new(ChoiceMergePolicy::ByName);
        let resumed = engine
            .apply(prefix, fragments[split].clone())
            .expect("last layer merges");

        prop_assert_eq!(all_at_once, resumed);
        Ok(())
    }

    fn check_delete_reinsert(
        base: Element,
        reinsert: Element,
    ) -> std::result::Result<(), TestCaseError> {
        let Some(name) = reinsert.name().map(str::to_string) else {
            return Ok(());
        };
        let mut reinsert = reinsert;
        reinsert.remove_attr(attr::DELETE);

        let delete = model([field(&name).with_attr(attr::DELETE, "true")]);
        let layered = merge(vec![base.clone(), delete, model([reinsert.clone()])]);
        let layered_field = layered
            .children()
            .iter()
            .find(|child| child.name() == Some(name.as_str()))
            .cloned();

        let fresh = merge(vec![model([reinsert])]);
        prop_assert_eq!(layered_field.as_ref(), fresh.children().first());
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_merge_is_associative(fragments in prop::collection::vec(arb_fragment(), 1..5)) {
            check_layering_is_incremental(fragments)?;
        }

        #[test]
        fn prop_delete_then_reinsert(base in arb_fragment(), reinsert in arb_field()) {
            check_delete_reinsert(base, reinsert)?;
        }
    }
}
