//! Stream graphs and imputation order.
//!
//! Each field's enabled `Stream`s form a directed multigraph over endpoint
//! names. Streams with `impute="true"` (the default) also form the
//! imputation subgraph, in which an endpoint is split per boundary region so
//! that traversal never crosses from one `boundary` tag to another. The
//! weakly connected components of that subgraph each get a deterministic
//! visitation order:
//!
//! 1. the lexicographically smallest topological order when acyclic;
//! 2. otherwise a breadth-first walk visiting successors in lexicographic
//!    order, starting at a `cycle-start` process, else an `impute-start`
//!    process, else the smallest node without predecessors, else the
//!    smallest node. Nodes the walk cannot reach are walked the same way
//!    from the smallest of them.

use std::collections::{BTreeSet, HashSet, VecDeque};

use indexmap::IndexMap;
use log::{debug, trace};
use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, NodeIndex},
    unionfind::UnionFind,
    visit::EdgeRef,
};

use flowsheet_core::element::{Tag, attr};

use crate::{
    error::{Diagnostic, ErrorCode},
    identity::Key,
    model::{NodeId, ResolvedModel},
};

/// A substance quantity carried by a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentAmount {
    pub name: String,
    pub phase: Option<String>,
    pub value: Option<String>,
}

/// Edge payload: one enabled stream.
#[derive(Debug, Clone)]
pub struct StreamEdge {
    key: Key,
    name: String,
    src: String,
    dst: String,
    impute: bool,
    boundary: Option<String>,
    components: Vec<ComponentAmount>,
    contains: Vec<String>,
}

impl StreamEdge {
    pub fn key(&self) -> Key {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dst(&self) -> &str {
        &self.dst
    }

    /// Returns `true` if the stream takes part in imputation.
    pub fn impute(&self) -> bool {
        self.impute
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn components(&self) -> &[ComponentAmount] {
        &self.components
    }

    /// Content identifiers from `Contains` children.
    pub fn contains(&self) -> &[String] {
        &self.contains
    }
}

/// One weakly connected component of the imputation subgraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImputationComponent {
    region: Option<String>,
    order: Vec<String>,
    edges: Vec<String>,
    edge_indices: Vec<EdgeIndex>,
    topological: bool,
    impute_starts: Vec<String>,
}

impl ImputationComponent {
    /// Returns the boundary tag shared by every edge, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Endpoints in visitation order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Names of the streams in this component, in document order.
    pub fn edges(&self) -> &[String] {
        &self.edges
    }

    /// Indices into [`FieldGraph::graph`] of the streams in this component,
    /// parallel to [`edges`](Self::edges).
    pub fn edge_indices(&self) -> &[EdgeIndex] {
        &self.edge_indices
    }

    /// Returns `true` if [`order`](Self::order) is topological, `false` if it
    /// comes from the breadth-first fallback.
    pub fn is_topological(&self) -> bool {
        self.topological
    }

    /// Endpoints of this component that are `impute-start` processes.
    pub fn impute_starts(&self) -> &[String] {
        &self.impute_starts
    }
}

/// The stream graph of one field.
#[derive(Debug, Clone)]
pub struct FieldGraph {
    field: String,
    key: Key,
    graph: DiGraph<String, StreamEdge>,
    components: Vec<ImputationComponent>,
}

impl FieldGraph {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// The full multigraph, including streams that do not impute.
    pub fn graph(&self) -> &DiGraph<String, StreamEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Endpoint names in order of first appearance.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    pub fn edges(&self) -> impl Iterator<Item = &StreamEdge> {
        self.graph.edge_weights()
    }

    /// Streams that take part in imputation.
    pub fn imputation_edges(&self) -> impl Iterator<Item = &StreamEdge> {
        self.edges().filter(|edge| edge.impute)
    }

    pub fn components(&self) -> &[ImputationComponent] {
        &self.components
    }
}

/// Build the stream graph of `field`.
///
/// Boundary-tagged streams that end up alone in their component are
/// reported as [`E401`](ErrorCode::E401) warnings.
pub fn build_field_graph(
    model: &ResolvedModel,
    field: NodeId,
    diagnostics: &mut Vec<Diagnostic>,
) -> FieldGraph {
    let field_node = model.node(field);
    let mut graph: DiGraph<String, StreamEdge> = DiGraph::new();
    let mut endpoints: IndexMap<String, NodeIndex> = IndexMap::new();

    for stream in model.children_tagged(field, Tag::Stream) {
        if !stream.is_enabled() {
            trace!(stream:% = stream.key(); "Skipping disabled stream");
            continue;
        }
        let edge = stream_edge(model, stream.id());
        let src = endpoint(&mut graph, &mut endpoints, &edge.src);
        let dst = endpoint(&mut graph, &mut endpoints, &edge.dst);
        graph.add_edge(src, dst, edge);
    }

    let (cycle_starts, impute_starts) = start_flags(model, field);
    let components = imputation_components(&graph, &cycle_starts, &impute_starts);

    for component in &components {
        if component.region.is_none() || component.edges.len() != 1 {
            continue;
        }
        let edge = &graph[component.edge_indices[0]];
        diagnostics.push(
            Diagnostic::warning(format!(
                "boundary stream `{}` is isolated in region `{}`",
                edge.name,
                component.region.as_deref().unwrap_or_default()
            ))
            .with_code(ErrorCode::E401)
            .with_label(edge.key, "no other stream shares this boundary")
            .with_help("connect it to another stream with the same boundary tag"),
        );
    }

    debug!(
        field = field_node.name().unwrap_or_default(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        components = components.len();
        "Stream graph built"
    );

    FieldGraph {
        field: field_node.name().unwrap_or_default().to_string(),
        key: field_node.key(),
        graph,
        components,
    }
}

fn endpoint(
    graph: &mut DiGraph<String, StreamEdge>,
    endpoints: &mut IndexMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    if let Some(index) = endpoints.get(name) {
        return *index;
    }
    let index = graph.add_node(name.to_string());
    endpoints.insert(name.to_string(), index);
    index
}

fn stream_edge(model: &ResolvedModel, stream: NodeId) -> StreamEdge {
    let node = model.node(stream);
    let components = model
        .children_tagged(stream, Tag::Component)
        .map(|component| ComponentAmount {
            name: component.name().unwrap_or_default().to_string(),
            phase: component.attr(attr::PHASE).map(str::to_string),
            value: component.text().map(|text| text.trim().to_string()),
        })
        .collect();
    let contains = model
        .children_tagged(stream, Tag::Contains)
        .filter_map(|contains| contains.text())
        .map(|text| text.trim().to_string())
        .collect();

    StreamEdge {
        key: node.key(),
        name: model.stream_name(stream),
        src: node.attr(attr::SRC).unwrap_or_default().to_string(),
        dst: node.attr(attr::DST).unwrap_or_default().to_string(),
        impute: node.flag(attr::IMPUTE),
        boundary: node.attr(attr::BOUNDARY).map(str::to_string),
        components,
        contains,
    }
}

/// Names of enabled processes flagged `cycle-start` and `impute-start`.
fn start_flags(model: &ResolvedModel, field: NodeId) -> (HashSet<String>, HashSet<String>) {
    let mut cycle_starts = HashSet::new();
    let mut impute_starts = HashSet::new();
    let mut pending = vec![field];
    while let Some(container) = pending.pop() {
        for child in model.children(container) {
            match child.tag() {
                Tag::Process if child.is_enabled() => {
                    let name = child.name().unwrap_or_default();
                    if child.flag(attr::CYCLE_START) {
                        cycle_starts.insert(name.to_string());
                    }
                    if child.flag(attr::IMPUTE_START) {
                        impute_starts.insert(name.to_string());
                    }
                }
                Tag::Aggregator if child.is_enabled() => pending.push(child.id()),
                _ => {}
            }
        }
    }
    (cycle_starts, impute_starts)
}

fn imputation_components(
    graph: &DiGraph<String, StreamEdge>,
    cycle_starts: &HashSet<String>,
    impute_starts: &HashSet<String>,
) -> Vec<ImputationComponent> {
    // Vertices are (region, endpoint) pairs.
    let mut vertices: IndexMap<(Option<&str>, &str), usize> = IndexMap::new();
    let mut imputing: Vec<(EdgeIndex, usize, usize)> = Vec::new();
    for edge in graph.edge_indices() {
        let weight = &graph[edge];
        if !weight.impute {
            continue;
        }
        let region = weight.boundary.as_deref();
        let next = vertices.len();
        let src = *vertices.entry((region, weight.src.as_str())).or_insert(next);
        let next = vertices.len();
        let dst = *vertices.entry((region, weight.dst.as_str())).or_insert(next);
        imputing.push((edge, src, dst));
    }

    let mut union = UnionFind::<usize>::new(vertices.len());
    for (_, src, dst) in &imputing {
        union.union(*src, *dst);
    }

    let mut grouped: IndexMap<usize, Vec<(EdgeIndex, usize, usize)>> = IndexMap::new();
    for (edge, src, dst) in imputing {
        grouped
            .entry(union.find(src))
            .or_default()
            .push((edge, src, dst));
    }

    let names: Vec<&str> = vertices.keys().map(|(_, name)| *name).collect();
    grouped
        .into_values()
        .map(|edges| {
            let region = graph[edges[0].0].boundary.clone();

            let mut component: DiGraph<&str, ()> = DiGraph::new();
            let mut local: IndexMap<usize, NodeIndex> = IndexMap::new();
            for (_, src, dst) in &edges {
                for vertex in [*src, *dst] {
                    if !local.contains_key(&vertex) {
                        local.insert(vertex, component.add_node(names[vertex]));
                    }
                }
                component.add_edge(local[src], local[dst], ());
            }

            let (order, topological) = visitation_order(&component, cycle_starts, impute_starts);
            let mut starts: Vec<String> = order
                .iter()
                .filter(|name| impute_starts.contains(*name))
                .cloned()
                .collect();
            starts.sort();

            ImputationComponent {
                region,
                order,
                edges: edges
                    .iter()
                    .map(|(edge, _, _)| graph[*edge].name.clone())
                    .collect(),
                edge_indices: edges.iter().map(|(edge, _, _)| *edge).collect(),
                topological,
                impute_starts: starts,
            }
        })
        .collect()
}

/// Returns the visitation order of one component and whether it is
/// topological.
fn visitation_order(
    component: &DiGraph<&str, ()>,
    cycle_starts: &HashSet<String>,
    impute_starts: &HashSet<String>,
) -> (Vec<String>, bool) {
    let name = |node: NodeIndex| component[node];
    let successors = |node: NodeIndex| {
        component
            .neighbors_directed(node, Direction::Outgoing)
            .map(|next| (name(next), next))
            .collect::<BTreeSet<_>>()
    };

    // Kahn's algorithm, always taking the smallest ready node.
    let mut in_degree: Vec<usize> = component
        .node_indices()
        .map(|node| component.edges_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<(&str, NodeIndex)> = component
        .node_indices()
        .filter(|node| in_degree[node.index()] == 0)
        .map(|node| (name(node), node))
        .collect();
    let mut order = Vec::with_capacity(component.node_count());
    while let Some((node_name, node)) = ready.pop_first() {
        order.push(node_name.to_string());
        for edge in component.edges_directed(node, Direction::Outgoing) {
            let next = edge.target();
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.insert((name(next), next));
            }
        }
    }
    if order.len() == component.node_count() {
        return (order, true);
    }

    let by_name: BTreeSet<(&str, NodeIndex)> = component
        .node_indices()
        .map(|node| (name(node), node))
        .collect();
    let sources: BTreeSet<(&str, NodeIndex)> = by_name
        .iter()
        .filter(|(_, node)| {
            component
                .neighbors_directed(*node, Direction::Incoming)
                .next()
                .is_none()
        })
        .copied()
        .collect();
    let start = by_name
        .iter()
        .find(|(node_name, _)| cycle_starts.contains(*node_name))
        .or_else(|| {
            by_name
                .iter()
                .find(|(node_name, _)| impute_starts.contains(*node_name))
        })
        .or_else(|| sources.first())
        .or_else(|| by_name.first())
        .copied();
    trace!(start:? = start.map(|(node_name, _)| node_name); "Cyclic component, walking breadth-first");

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut order = Vec::with_capacity(component.node_count());
    let mut next_start = start;
    while let Some((_, start)) = next_start {
        let mut queue = VecDeque::from([start]);
        visited.insert(start);
        while let Some(node) = queue.pop_front() {
            order.push(name(node).to_string());
            for (_, next) in successors(node) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        next_start = by_name
            .iter()
            .find(|(_, node)| !visited.contains(node))
            .copied();
    }
    (order, false)
}

#[cfg(test)]
mod tests {
    use flowsheet_core::element::Element;

    use super::*;

    fn stream(src: &str, dst: &str) -> Element {
        Element::new(Tag::Stream)
            .with_attr(attr::SRC, src)
            .with_attr(attr::DST, dst)
    }

    fn build(field: Element) -> (FieldGraph, Vec<Diagnostic>) {
        let model = ResolvedModel::freeze(
            Element::new(Tag::Model).with_child(field),
            &IndexMap::new(),
        )
        .expect("freeze");
        let field = model.fields().next().expect("field").id();
        let mut diagnostics = Vec::new();
        let graph = build_field_graph(&model, field, &mut diagnostics);
        (graph, diagnostics)
    }

    #[test]
    fn test_payload_is_kept() {
        let (graph, _) = build(
            Element::named(Tag::Field, "F").with_child(
                stream("well", "separator")
                    .with_child(
                        Element::named(Tag::Component, "oil")
                            .with_attr(attr::PHASE, "liquid")
                            .with_text(" 100 "),
                    )
                    .with_child(Element::new(Tag::Contains).with_text("crude oil")),
            ),
        );

        let edge = graph.edges().next().expect("one edge");
        assert_eq!(edge.name(), "well => separator");
        assert_eq!(
            edge.components(),
            [ComponentAmount {
                name: "oil".to_string(),
                phase: Some("liquid".to_string()),
                value: Some("100".to_string()),
            }]
        );
        assert_eq!(edge.contains(), ["crude oil"]);
    }

    #[test]
    fn test_topological_order_is_lexicographic() {
        let (graph, _) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("S", "M"))
                .with_child(stream("A", "M"))
                .with_child(stream("M", "Z")),
        );

        let components = graph.components();
        assert_eq!(components.len(), 1);
        assert!(components[0].is_topological());
        assert_eq!(components[0].order(), ["A", "S", "M", "Z"]);
    }

    #[test]
    fn test_cycle_falls_back_to_breadth_first() {
        let (graph, _) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("A", "B"))
                .with_child(stream("B", "C"))
                .with_child(stream("C", "A"))
                .with_child(stream("C", "D")),
        );

        let component = &graph.components()[0];
        assert!(!component.is_topological());
        assert_eq!(component.order(), ["A", "B", "C", "D"]);
    }

    #[test]
    fn test_cycle_start_process_leads_fallback() {
        let (graph, _) = build(
            Element::named(Tag::Field, "F")
                .with_child(Element::named(Tag::Process, "C").with_attr(attr::CYCLE_START, "true"))
                .with_child(
                    Element::named(Tag::Process, "B").with_attr(attr::IMPUTE_START, "true"),
                )
                .with_child(stream("A", "B"))
                .with_child(stream("B", "C"))
                .with_child(stream("C", "A")),
        );

        let component = &graph.components()[0];
        assert_eq!(component.order(), ["C", "A", "B"]);
        assert_eq!(component.impute_starts(), ["B"]);
    }

    #[test]
    fn test_impute_false_excluded_from_imputation() {
        let (graph, _) = build(
            Element::named(Tag::Field, "R1")
                .with_child(stream("A", "B"))
                .with_child(stream("B", "C").with_attr(attr::IMPUTE, "false")),
        );

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let imputing: Vec<&str> = graph.imputation_edges().map(StreamEdge::name).collect();
        assert_eq!(imputing, ["A => B"]);
        assert_eq!(graph.components().len(), 1);
        assert_eq!(graph.components()[0].order(), ["A", "B"]);
    }

    #[test]
    fn test_boundary_splits_components() {
        let (graph, diags) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("W", "X"))
                .with_child(stream("X", "Y").with_attr(attr::BOUNDARY, "outside")),
        );

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.components().len(), 2);
        assert_eq!(graph.components()[1].region(), Some("outside"));

        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), Some(ErrorCode::E401));
        assert!(diags[0].severity().is_warning());
    }

    #[test]
    fn test_same_boundary_joins() {
        let (graph, diags) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("W", "X").with_attr(attr::BOUNDARY, "outside"))
                .with_child(stream("X", "Y").with_attr(attr::BOUNDARY, "outside")),
        );

        assert_eq!(graph.components().len(), 1);
        assert_eq!(graph.components()[0].order(), ["W", "X", "Y"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_disabled_streams_are_left_out() {
        let (graph, _) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("A", "B"))
                .with_child(stream("B", "C").with_attr(attr::ENABLED, "false")),
        );

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.endpoints().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn test_isolated_boundary_warning_names_its_own_stream() {
        let (graph, diags) = build(
            Element::named(Tag::Field, "F")
                .with_child(stream("A", "B"))
                .with_child(stream("A", "B").with_attr(attr::BOUNDARY, "outside")),
        );

        assert_eq!(graph.components().len(), 2);
        let isolated = &graph.components()[1];
        assert_eq!(isolated.region(), Some("outside"));
        assert_eq!(isolated.edge_indices().len(), 1);
        assert_eq!(
            graph.graph()[isolated.edge_indices()[0]].boundary(),
            Some("outside")
        );

        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].primary_key().map(|key| key.to_string()),
            Some("Model/Field[F]/Stream[A => B#2]".to_string())
        );
    }
}
