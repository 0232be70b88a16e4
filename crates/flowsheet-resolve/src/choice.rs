//! Process-choice resolution.
//!
//! Each `ProcessChoice` selects one of its `ProcessGroup`s: the one named by
//! `default`, or the only group when there is just one. References inside
//! the active group are checked against the field's processes and streams,
//! nested choices in the active group are resolved in turn, and the field's
//! process set is flattened into a [`ProcessSelection`].
//!
//! A `ProcessChoice` without groups, and an `Aggregator` without children,
//! refer to the field-level definition of the same name. Following those
//! references is the only way a structure can contain itself, which is
//! reported as [`E102`](ErrorCode::E102) before anything is selected.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, trace};

use flowsheet_core::element::{Tag, attr};

use crate::{
    error::{Diagnostic, ErrorCode, Result},
    identity::Key,
    model::{NodeId, ResolvedModel},
};

/// The group chosen for one `ProcessChoice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOutcome {
    key: Key,
    name: String,
    group: String,
    processes: Vec<String>,
    streams: Vec<String>,
}

impl ChoiceOutcome {
    pub fn key(&self) -> Key {
        self.key
    }

    /// Returns the choice name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the active group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Processes referenced by the active group.
    pub fn processes(&self) -> &[String] {
        &self.processes
    }

    /// Streams referenced by the active group.
    pub fn streams(&self) -> &[String] {
        &self.streams
    }
}

/// Flattened process set of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSelection {
    field: String,
    key: Key,
    active_processes: Vec<String>,
    active_streams: Vec<String>,
    choices: Vec<ChoiceOutcome>,
}

impl ProcessSelection {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Enabled processes not excluded by an inactive group, in document
    /// order.
    pub fn active_processes(&self) -> &[String] {
        &self.active_processes
    }

    /// Enabled streams not excluded by an inactive group, in document order.
    pub fn active_streams(&self) -> &[String] {
        &self.active_streams
    }

    /// Resolved choices in traversal order.
    pub fn choices(&self) -> &[ChoiceOutcome] {
        &self.choices
    }

    /// Returns the outcome of the choice named `name`.
    pub fn choice(&self, name: &str) -> Option<&ChoiceOutcome> {
        self.choices.iter().find(|choice| choice.name == name)
    }

    pub fn is_active(&self, process: &str) -> bool {
        self.active_processes.iter().any(|name| name == process)
    }
}

/// Named things a field defines, with their effective enabled state.
#[derive(Debug, Default)]
struct FieldIndex {
    processes: IndexMap<String, bool>,
    streams: IndexMap<String, bool>,
    choice_defs: IndexMap<String, NodeId>,
    aggregator_defs: IndexMap<String, NodeId>,
    choices: Vec<NodeId>,
}

impl FieldIndex {
    fn build(model: &ResolvedModel, field: NodeId) -> Self {
        let mut index = Self::default();
        index.scan(model, field, true);
        for stream in model.children_tagged(field, Tag::Stream) {
            index
                .streams
                .insert(model.stream_name(stream.id()), stream.is_enabled());
        }
        index
    }

    /// Scan a field or aggregator body. Groups are not entered.
    fn scan(&mut self, model: &ResolvedModel, container: NodeId, enabled: bool) {
        for child in model.children(container) {
            match child.tag() {
                Tag::Process => {
                    if let Some(name) = child.name() {
                        self.processes
                            .insert(name.to_string(), enabled && child.is_enabled());
                    }
                }
                Tag::ProcessChoice => {
                    if enabled && child.is_enabled() {
                        self.choices.push(child.id());
                    }
                    if is_choice_definition(model, child.id()) {
                        if let Some(name) = child.name() {
                            self.choice_defs.insert(name.to_string(), child.id());
                        }
                    }
                }
                Tag::Aggregator if !child.children().is_empty() => {
                    if let Some(name) = child.name() {
                        self.aggregator_defs.insert(name.to_string(), child.id());
                    }
                    self.scan(model, child.id(), enabled && child.is_enabled());
                }
                _ => {}
            }
        }
    }
}

fn is_choice_definition(model: &ResolvedModel, choice: NodeId) -> bool {
    model.children_tagged(choice, Tag::ProcessGroup).next().is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Resolve the process choices of one field.
///
/// Collected problems ([`E301`](ErrorCode::E301),
/// [`E305`](ErrorCode::E305)) are appended to `diagnostics`.
///
/// # Errors
///
/// Returns [`E102`](ErrorCode::E102) for self-containing structures and
/// [`E103`](ErrorCode::E103) for a choice without a usable default.
pub fn resolve_field(
    model: &ResolvedModel,
    field: NodeId,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ProcessSelection> {
    let field_node = model.node(field);
    let index = FieldIndex::build(model, field);

    check_cycles(model, &index.aggregator_defs, Tag::Aggregator)?;
    check_cycles(model, &index.choice_defs, Tag::ProcessChoice)?;

    let mut walker = ChoiceWalker {
        model,
        index: &index,
        resolved: HashSet::new(),
        outcomes: Vec::new(),
        active_processes: HashSet::new(),
        inactive_processes: HashSet::new(),
        active_streams: HashSet::new(),
        inactive_streams: HashSet::new(),
        diagnostics,
    };
    for choice in &index.choices {
        walker.walk_choice(*choice)?;
    }

    let active_processes = flatten(
        &index.processes,
        &walker.active_processes,
        &walker.inactive_processes,
    );
    let active_streams = flatten(
        &index.streams,
        &walker.active_streams,
        &walker.inactive_streams,
    );

    let selection = ProcessSelection {
        field: field_node.name().unwrap_or_default().to_string(),
        key: field_node.key(),
        active_processes,
        active_streams,
        choices: walker.outcomes,
    };
    debug!(
        field = selection.field(),
        processes = selection.active_processes.len(),
        choices = selection.choices.len();
        "Process choices resolved"
    );
    Ok(selection)
}

/// Enabled names minus those referenced only by inactive groups.
fn flatten(
    defined: &IndexMap<String, bool>,
    active: &HashSet<String>,
    inactive: &HashSet<String>,
) -> Vec<String> {
    defined
        .iter()
        .filter(|(name, enabled)| **enabled && (active.contains(*name) || !inactive.contains(*name)))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Depth-first search over definitions, following name references.
fn check_cycles(model: &ResolvedModel, defs: &IndexMap<String, NodeId>, tag: Tag) -> Result<()> {
    fn references(model: &ResolvedModel, node: NodeId, tag: &Tag, out: &mut Vec<NodeId>) {
        for child in model.children(node) {
            if child.tag() == tag && child.children().is_empty() {
                out.push(child.id());
            } else {
                references(model, child.id(), tag, out);
            }
        }
    }

    fn visit(
        model: &ResolvedModel,
        node: NodeId,
        defs: &IndexMap<String, NodeId>,
        tag: &Tag,
        state: &mut HashMap<NodeId, Visit>,
    ) -> Result<()> {
        match state.get(&node) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let def = model.node(node);
                return Err(Diagnostic::error(format!(
                    "{tag} `{}` contains itself",
                    def.name().unwrap_or_default()
                ))
                .with_code(ErrorCode::E102)
                .with_label(def.key(), "part of a reference cycle"));
            }
            None => {}
        }
        state.insert(node, Visit::InProgress);

        let mut refs = Vec::new();
        references(model, node, tag, &mut refs);
        for reference in refs {
            let target = model
                .node(reference)
                .name()
                .and_then(|name| defs.get(name));
            if let Some(target) = target {
                trace!(reference:% = model.node(reference).key(); "Following reference");
                visit(model, *target, defs, tag, state).map_err(|diag| {
                    diag.with_secondary_label(model.node(reference).key(), "referenced here")
                })?;
            }
        }

        state.insert(node, Visit::Done);
        Ok(())
    }

    let mut state = HashMap::new();
    for def in defs.values() {
        visit(model, *def, defs, &tag, &mut state)?;
    }
    Ok(())
}

struct ChoiceWalker<'a> {
    model: &'a ResolvedModel,
    index: &'a FieldIndex,
    resolved: HashSet<NodeId>,
    outcomes: Vec<ChoiceOutcome>,
    active_processes: HashSet<String>,
    inactive_processes: HashSet<String>,
    active_streams: HashSet<String>,
    inactive_streams: HashSet<String>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl ChoiceWalker<'_> {
    fn walk_choice(&mut self, choice: NodeId) -> Result<()> {
        let node = self.model.node(choice);
        let def = if is_choice_definition(self.model, choice) {
            choice
        } else {
            let name = node.name().unwrap_or_default();
            match self.index.choice_defs.get(name) {
                Some(def) => *def,
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(format!("reference to undefined process choice `{name}`"))
                            .with_code(ErrorCode::E301)
                            .with_label(node.key(), "referenced here"),
                    );
                    return Ok(());
                }
            }
        };
        if !self.resolved.insert(def) {
            return Ok(());
        }

        let chosen = self.select_group(def)?;
        let def_node = self.model.node(def);
        let slot = self.outcomes.len();
        self.outcomes.push(ChoiceOutcome {
            key: def_node.key(),
            name: def_node.name().unwrap_or_default().to_string(),
            group: self
                .model
                .node(chosen)
                .name()
                .unwrap_or_default()
                .to_string(),
            processes: Vec::new(),
            streams: Vec::new(),
        });

        let groups: Vec<NodeId> = self
            .model
            .children_tagged(def, Tag::ProcessGroup)
            .map(|group| group.id())
            .collect();
        for group in groups {
            if group == chosen {
                self.collect_active(group, slot)?;
            } else {
                self.collect_inactive(group);
            }
        }
        Ok(())
    }

    fn select_group(&mut self, def: NodeId) -> Result<NodeId> {
        let node = self.model.node(def);
        let name = node.name().unwrap_or_default();
        let groups: Vec<_> = self.model.children_tagged(def, Tag::ProcessGroup).collect();

        if let Some(default) = node.attr(attr::DEFAULT) {
            if let Some(group) = groups.iter().find(|group| group.name() == Some(default)) {
                return Ok(group.id());
            }
            self.diagnostics.push(
                Diagnostic::warning(format!(
                    "default `{default}` of process choice `{name}` names no group"
                ))
                .with_code(ErrorCode::E305)
                .with_label(node.key(), "declared here"),
            );
        }

        match groups.as_slice() {
            [only] => Ok(only.id()),
            _ => Err(Diagnostic::error(format!(
                "process choice `{name}` has {} groups and no usable default",
                groups.len()
            ))
            .with_code(ErrorCode::E103)
            .with_label(node.key(), "ambiguous choice")
            .with_help("set `default` to the name of one of its ProcessGroups")),
        }
    }

    fn collect_active(&mut self, group: NodeId, slot: usize) -> Result<()> {
        let children: Vec<NodeId> = self.model.node(group).children().to_vec();
        for child in children {
            let node = self.model.node(child);
            let name = node.name().unwrap_or_default().to_string();
            match node.tag() {
                Tag::ProcessRef => {
                    if self.index.processes.contains_key(&name) {
                        self.outcomes[slot].processes.push(name.clone());
                        self.active_processes.insert(name);
                    } else {
                        self.dangling(node.key(), "process", &name);
                    }
                }
                Tag::StreamRef => {
                    if self.index.streams.contains_key(&name) {
                        self.outcomes[slot].streams.push(name.clone());
                        self.active_streams.insert(name);
                    } else {
                        self.dangling(node.key(), "stream", &name);
                    }
                }
                Tag::ProcessChoice => self.walk_choice(child)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Record every reference below an inactive group without checking it.
    fn collect_inactive(&mut self, group: NodeId) {
        let model = self.model;
        for child in model.children(group) {
            let name = child.name().unwrap_or_default().to_string();
            match child.tag() {
                Tag::ProcessRef => {
                    self.inactive_processes.insert(name);
                }
                Tag::StreamRef => {
                    self.inactive_streams.insert(name);
                }
                Tag::ProcessChoice => {
                    for nested in model.children_tagged(child.id(), Tag::ProcessGroup) {
                        self.collect_inactive(nested.id());
                    }
                }
                _ => {}
            }
        }
    }

    fn dangling(&mut self, key: Key, kind: &str, name: &str) {
        self.diagnostics.push(
            Diagnostic::error(format!("reference to undefined {kind} `{name}`"))
                .with_code(ErrorCode::E301)
                .with_label(key, "referenced here"),
        );
    }
}
