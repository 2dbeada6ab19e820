//! In-memory graph store
//!
//! A small property graph implementing `GraphClient`, used by the demo
//! binary and the test suite. Adjacency lists keep insertion order and
//! result rows are sorted by node id, so repeated executions of the same
//! plan are byte-identical.

use crate::exec::{
    path_binding, EdgeRecord, GraphClient, GraphValue, NodeRecord, PathRecord, RawResult,
    ResultRow, StoreFault, TARGET_BINDING,
};
use crate::intent::{ScalarValue, TraverseDirection};
use crate::plan::{AggregateSpec, AttrPredicate, BoundHop, BoundTraversal, QueryPlan};
use async_trait::async_trait;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Paths kept per result for explanation traces; intermediate-node counts
/// are accumulated over every path regardless.
const MAX_TRACE_PATHS: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum MemoryGraphError {
    #[error("node {0} not found")]
    NodeNotFound(u64),
}

pub type MemoryGraphResult<T> = Result<T, MemoryGraphError>;

/// In-memory property graph
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: FxHashMap<u64, NodeRecord>,
    edges: FxHashMap<u64, EdgeRecord>,
    outgoing: FxHashMap<u64, Vec<u64>>,
    incoming: FxHashMap<u64, Vec<u64>>,
    by_kind: FxHashMap<String, Vec<u64>>,
    next_node_id: u64,
    next_edge_id: u64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(&mut self, kind: &str) -> u64 {
        self.next_node_id += 1;
        let id = self.next_node_id;
        self.nodes.insert(
            id,
            NodeRecord {
                id,
                kind: kind.to_string(),
                attrs: IndexMap::new(),
            },
        );
        self.by_kind.entry(kind.to_string()).or_default().push(id);
        id
    }

    pub fn set_node_attr(
        &mut self,
        id: u64,
        key: &str,
        value: impl Into<ScalarValue>,
    ) -> MemoryGraphResult<()> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(MemoryGraphError::NodeNotFound(id))?;
        node.attrs.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn create_edge(&mut self, source: u64, target: u64, kind: &str) -> MemoryGraphResult<u64> {
        if !self.nodes.contains_key(&source) {
            return Err(MemoryGraphError::NodeNotFound(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(MemoryGraphError::NodeNotFound(target));
        }
        self.next_edge_id += 1;
        let id = self.next_edge_id;
        self.edges.insert(
            id,
            EdgeRecord {
                id,
                kind: kind.to_string(),
                source,
                target,
                attrs: IndexMap::new(),
            },
        );
        self.outgoing.entry(source).or_default().push(id);
        self.incoming.entry(target).or_default().push(id);
        Ok(id)
    }

    pub fn set_edge_attr(
        &mut self,
        id: u64,
        key: &str,
        value: impl Into<ScalarValue>,
    ) -> MemoryGraphResult<()> {
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or(MemoryGraphError::NodeNotFound(id))?;
        edge.attrs.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Execute a plan. Pure and synchronous; the async trait wrapper is
    /// what the executor talks to.
    pub fn run_plan(&self, plan: &QueryPlan) -> RawResult {
        let walks: Vec<Walk> = plan
            .traversals
            .iter()
            .map(|traversal| self.walk(traversal))
            .collect();

        let mut candidates: Vec<u64> = if walks.is_empty() {
            self.by_kind
                .get(&plan.target_kind)
                .map(|ids| ids.clone())
                .unwrap_or_default()
        } else {
            // Intersection over the shared result binding
            let mut ids: FxHashSet<u64> =
                walks[0].hits.keys().copied().collect();
            for walk in &walks[1..] {
                ids.retain(|id| walk.hits.contains_key(id));
            }
            ids.into_iter().collect()
        };

        candidates.retain(|id| self.passes(*id, &plan.target_predicates));

        if plan.exclude_origins {
            let mut excluded: FxHashSet<u64> = FxHashSet::default();
            for (walk, traversal) in walks.iter().zip(&plan.traversals) {
                if traversal.origin_kind == plan.target_kind {
                    excluded.extend(walk.seeds.iter().copied());
                }
            }
            candidates.retain(|id| !excluded.contains(id));
        }

        candidates.sort_unstable();
        candidates.truncate(plan.row_cap);

        let all_seeds: Vec<u64> = {
            let mut seen = FxHashSet::default();
            let mut seeds = Vec::new();
            for walk in &walks {
                for seed in &walk.seeds {
                    if seen.insert(*seed) {
                        seeds.push(*seed);
                    }
                }
            }
            seeds
        };

        let mut rows = Vec::with_capacity(candidates.len());
        for id in candidates {
            let mut row = ResultRow::new();
            row.bind(TARGET_BINDING, GraphValue::Node(self.nodes[&id].clone()));

            for (index, walk) in walks.iter().enumerate() {
                let value = walk
                    .hits
                    .get(&id)
                    .and_then(|hit| hit.representative())
                    .map(|path| GraphValue::Path(self.materialize(path)))
                    .unwrap_or(GraphValue::Null);
                row.bind(path_binding(index), value);
            }

            for (signal, spec) in &plan.aggregates {
                row.bind(signal.name(), self.aggregate(spec, id, &walks, &all_seeds));
            }

            rows.push(row);
        }

        RawResult { rows }
    }

    fn passes(&self, id: u64, predicates: &[AttrPredicate]) -> bool {
        let Some(node) = self.nodes.get(&id) else { return false };
        predicates
            .iter()
            .all(|predicate| predicate.matches(node.attr(&predicate.attribute)))
    }

    fn walk(&self, traversal: &BoundTraversal) -> Walk {
        let seeds: Vec<u64> = self
            .by_kind
            .get(&traversal.origin_kind)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| self.passes(*id, &traversal.origin_predicates))
                    .collect()
            })
            .unwrap_or_default();

        let mut hits: FxHashMap<u64, Hit> = FxHashMap::default();
        for &seed in &seeds {
            let mut nodes = vec![seed];
            let mut edges = Vec::new();
            self.dfs(seed, &traversal.hops, &mut nodes, &mut edges, &mut hits);
        }

        Walk { seeds, hits }
    }

    /// Depth-first expansion of the bound hops. Paths are simple (no node
    /// repeats), which also keeps a seed from reaching itself.
    fn dfs(
        &self,
        node: u64,
        remaining: &[BoundHop],
        nodes: &mut Vec<u64>,
        edges: &mut Vec<u64>,
        hits: &mut FxHashMap<u64, Hit>,
    ) {
        let Some((hop, rest)) = remaining.split_first() else {
            let hit = hits.entry(node).or_default();
            hit.record(nodes, edges);
            return;
        };

        for (edge_id, next) in self.expand(node, hop) {
            if nodes.contains(&next) {
                continue;
            }
            nodes.push(next);
            edges.push(edge_id);
            self.dfs(next, rest, nodes, edges, hits);
            nodes.pop();
            edges.pop();
        }
    }

    /// Edges leaving `node` along one hop, honoring direction and the
    /// bound endpoint kind.
    fn expand(&self, node: u64, hop: &BoundHop) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        let forward = hop.direction == TraverseDirection::Forward || hop.undirected;
        let reverse = hop.direction == TraverseDirection::Reverse || hop.undirected;

        if forward {
            for &edge_id in self.outgoing.get(&node).into_iter().flatten() {
                let edge = &self.edges[&edge_id];
                if edge.kind == hop.edge && self.kind_of(edge.target) == Some(&hop.to_kind) {
                    out.push((edge_id, edge.target));
                }
            }
        }
        if reverse {
            for &edge_id in self.incoming.get(&node).into_iter().flatten() {
                let edge = &self.edges[&edge_id];
                if edge.kind == hop.edge && self.kind_of(edge.source) == Some(&hop.to_kind) {
                    out.push((edge_id, edge.source));
                }
            }
        }
        out
    }

    fn kind_of(&self, id: u64) -> Option<&String> {
        self.nodes.get(&id).map(|node| &node.kind)
    }

    fn materialize(&self, path: &StoredPath) -> PathRecord {
        PathRecord {
            nodes: path
                .nodes
                .iter()
                .map(|id| self.nodes[id].clone())
                .collect(),
            edges: path
                .edges
                .iter()
                .map(|id| self.edges[id].clone())
                .collect(),
        }
    }

    fn aggregate(
        &self,
        spec: &AggregateSpec,
        target: u64,
        walks: &[Walk],
        seeds: &[u64],
    ) -> GraphValue {
        match spec {
            AggregateSpec::SharedNeighbors => {
                if walks.is_empty() {
                    return GraphValue::Null;
                }
                let mut intermediates: FxHashSet<u64> = FxHashSet::default();
                for walk in walks {
                    if let Some(hit) = walk.hits.get(&target) {
                        intermediates.extend(hit.intermediates.iter().copied());
                    }
                }
                GraphValue::Scalar(ScalarValue::Integer(intermediates.len() as i64))
            }
            AggregateSpec::SharedNeighborsVia { edge } => {
                if seeds.is_empty() {
                    return GraphValue::Null;
                }
                let target_neighbors = self.neighbors_via(target, edge);
                let mut shared: FxHashSet<u64> = FxHashSet::default();
                for &seed in seeds {
                    for neighbor in self.neighbors_via(seed, edge) {
                        if target_neighbors.contains(&neighbor) {
                            shared.insert(neighbor);
                        }
                    }
                }
                GraphValue::Scalar(ScalarValue::Integer(shared.len() as i64))
            }
            AggregateSpec::IncidentEdgeMean { edge, attribute } => {
                match self.incident_mean(target, edge, attribute) {
                    Some(mean) => GraphValue::Scalar(ScalarValue::Float(mean)),
                    None => GraphValue::Null,
                }
            }
            AggregateSpec::SharedNeighborAttrOverlap {
                edge,
                attribute,
                tolerance,
            } => {
                if seeds.is_empty() {
                    return GraphValue::Null;
                }
                let target_neighbors = self.neighbors_via(target, edge);
                let mut overlapping: FxHashSet<u64> = FxHashSet::default();
                for &seed in seeds {
                    for neighbor in self.neighbors_via(seed, edge) {
                        if !target_neighbors.contains(&neighbor) {
                            continue;
                        }
                        let near = self.attr_between(neighbor, seed, edge, attribute);
                        let far = self.attr_between(neighbor, target, edge, attribute);
                        if let (Some(a), Some(b)) = (near, far) {
                            if (a - b).abs() <= *tolerance {
                                overlapping.insert(neighbor);
                            }
                        }
                    }
                }
                GraphValue::Scalar(ScalarValue::Integer(overlapping.len() as i64))
            }
            AggregateSpec::NodeAttr { attribute } => self
                .nodes
                .get(&target)
                .and_then(|node| node.attr(attribute))
                .map(|value| GraphValue::Scalar(value.clone()))
                .unwrap_or(GraphValue::Null),
        }
    }

    /// Neighbors over one edge kind, either direction
    fn neighbors_via(&self, node: u64, edge_kind: &str) -> FxHashSet<u64> {
        let mut neighbors = FxHashSet::default();
        for &edge_id in self.outgoing.get(&node).into_iter().flatten() {
            let edge = &self.edges[&edge_id];
            if edge.kind == edge_kind {
                neighbors.insert(edge.target);
            }
        }
        for &edge_id in self.incoming.get(&node).into_iter().flatten() {
            let edge = &self.edges[&edge_id];
            if edge.kind == edge_kind {
                neighbors.insert(edge.source);
            }
        }
        neighbors
    }

    fn incident_mean(&self, node: u64, edge_kind: &str, attribute: &str) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        let incident = self
            .outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(&node).into_iter().flatten());
        for &edge_id in incident {
            let edge = &self.edges[&edge_id];
            if edge.kind == edge_kind {
                if let Some(value) = edge.attr(attribute).and_then(ScalarValue::as_float) {
                    sum += value;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Attribute of the first edge of a kind connecting two nodes
    fn attr_between(&self, a: u64, b: u64, edge_kind: &str, attribute: &str) -> Option<f64> {
        let candidates = self
            .outgoing
            .get(&a)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(&a).into_iter().flatten());
        for &edge_id in candidates {
            let edge = &self.edges[&edge_id];
            if edge.kind == edge_kind && (edge.source == b || edge.target == b) {
                if let Some(value) = edge.attr(attribute).and_then(ScalarValue::as_float) {
                    return Some(value);
                }
            }
        }
        None
    }
}

#[async_trait]
impl GraphClient for MemoryGraph {
    async fn run(&self, plan: &QueryPlan) -> Result<RawResult, StoreFault> {
        Ok(self.run_plan(plan))
    }
}

/// One traversal's worth of matches
struct Walk {
    seeds: Vec<u64>,
    hits: FxHashMap<u64, Hit>,
}

/// Paths and intermediates collected for one terminal node
#[derive(Default)]
struct Hit {
    paths: Vec<StoredPath>,
    intermediates: FxHashSet<u64>,
}

#[derive(Clone)]
struct StoredPath {
    nodes: Vec<u64>,
    edges: Vec<u64>,
}

impl Hit {
    fn record(&mut self, nodes: &[u64], edges: &[u64]) {
        // Everything strictly between origin and terminal
        if nodes.len() > 1 {
            self.intermediates
                .extend(nodes[1..nodes.len() - 1].iter().copied());
        }
        if self.paths.len() < MAX_TRACE_PATHS {
            self.paths.push(StoredPath {
                nodes: nodes.to_vec(),
                edges: edges.to_vec(),
            });
        }
    }

    /// Deterministic representative path: smallest edge-id sequence
    fn representative(&self) -> Option<&StoredPath> {
        self.paths.iter().min_by(|a, b| a.edges.cmp(&b.edges))
    }
}
