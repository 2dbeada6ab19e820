//! Plan builder
//!
//! Binds a validated intent's path constraints to concrete schema edges,
//! picks the shallowest depth that satisfies each constraint, places every
//! filter on the kind it is anchored to, and prices the result against the
//! configured cost ceiling.

use crate::config::{PlannerConfig, SignalBindings};
use crate::intent::{
    Filter, FilterAnchor, PathConstraint, QueryIntent, Signal, TraverseDirection,
};
use crate::plan::{
    AggregateSpec, AttrPredicate, BoundHop, BoundTraversal, PlanError, PlanResult, QueryPlan,
};
use crate::schema::{EdgeKind, GraphSchema, NodeKind};
use tracing::debug;

/// Rows fetched beyond the intent limit so min-score drops don't starve
/// the response.
const ROW_OVERFETCH: usize = 10;
const ROW_CAP_FLOOR: usize = 100;

/// Ratings agreeing within this distance count as overlapping.
const RATING_TOLERANCE: f64 = 1.0;

pub struct PlanBuilder<'a> {
    schema: &'a GraphSchema,
    config: &'a PlannerConfig,
    bindings: &'a SignalBindings,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        schema: &'a GraphSchema,
        config: &'a PlannerConfig,
        bindings: &'a SignalBindings,
    ) -> Self {
        Self {
            schema,
            config,
            bindings,
        }
    }

    /// Build an executable plan from a schema-validated intent
    pub fn build(&self, intent: &QueryIntent) -> PlanResult<QueryPlan> {
        let target = self.node_kind(&intent.target)?;

        let mut traversals = Vec::with_capacity(intent.paths.len());
        for (index, constraint) in intent.paths.iter().enumerate() {
            traversals.push(self.bind_traversal(intent, index, constraint)?);
        }

        let target_predicates = self.bind_predicates(
            intent
                .filters
                .iter()
                .filter(|f| f.anchor == FilterAnchor::Target),
            target,
        )?;

        let aggregates = self.bind_aggregates(intent)?;

        let cost_estimate = estimate_cost(&traversals, target);
        if cost_estimate > self.config.cost_ceiling {
            return Err(PlanError::TooExpensive(format!(
                "estimated cost {} exceeds ceiling {}",
                cost_estimate, self.config.cost_ceiling
            )));
        }

        let exclude_origins = traversals
            .iter()
            .any(|t| t.origin_kind == intent.target);

        let plan = QueryPlan {
            target_kind: intent.target.clone(),
            traversals,
            target_predicates,
            aggregates,
            exclude_origins,
            row_cap: (intent.limit * ROW_OVERFETCH).max(ROW_CAP_FLOOR),
            cost_estimate,
        };
        debug!(
            kind = %plan.target_kind,
            traversals = plan.traversals.len(),
            cost = plan.cost_estimate,
            "plan built"
        );
        Ok(plan)
    }

    fn node_kind(&self, name: &str) -> PlanResult<&NodeKind> {
        self.schema
            .node_kind(name)
            .ok_or_else(|| PlanError::Unsatisfiable(format!("undeclared node kind {name}")))
    }

    fn edge_kind(&self, name: &str) -> PlanResult<&EdgeKind> {
        self.schema
            .edge_kind(name)
            .ok_or_else(|| PlanError::Unsatisfiable(format!("undeclared edge kind {name}")))
    }

    fn bind_traversal(
        &self,
        intent: &QueryIntent,
        index: usize,
        constraint: &PathConstraint,
    ) -> PlanResult<BoundTraversal> {
        if constraint.depth.max > self.config.max_depth {
            return Err(PlanError::TooExpensive(format!(
                "depth range [{}, {}] exceeds maximum depth {}",
                constraint.depth.min, constraint.depth.max, self.config.max_depth
            )));
        }
        if constraint.steps.is_empty() {
            return Err(PlanError::Unsatisfiable("path constraint has no steps".into()));
        }
        if constraint.steps.len() > constraint.depth.max as usize {
            return Err(PlanError::Unsatisfiable(format!(
                "constraint describes {} hops but its depth range allows at most {}",
                constraint.steps.len(),
                constraint.depth.max
            )));
        }

        // Shallowest depth that fits both the step sequence and the range.
        let depth = (constraint.steps.len() as u32).max(constraint.depth.min) as usize;
        let steps: Vec<_> = if constraint.steps.len() == depth {
            constraint.steps.iter().collect()
        } else if constraint.steps.len() == 1 {
            // A single-step constraint expands by repetition (friend-of-a-
            // friend shapes); multi-step sequences cannot be stretched.
            std::iter::repeat(&constraint.steps[0]).take(depth).collect()
        } else {
            return Err(PlanError::Unsatisfiable(format!(
                "depth range requires {} hops but constraint describes {} steps",
                depth,
                constraint.steps.len()
            )));
        };

        let hops = self.bind_chain(&steps, &intent.target)?;
        let origin_kind = hops[0].from_kind.clone();

        let origin = self.node_kind(&origin_kind)?;
        let origin_predicates = self.bind_predicates(
            intent
                .filters
                .iter()
                .filter(|f| f.anchor == FilterAnchor::PathStart(index)),
            origin,
        )?;

        Ok(BoundTraversal {
            origin_kind,
            origin_predicates,
            hops,
        })
    }

    /// Resolve hop orientations so each hop's source kind continues the
    /// previous hop's terminal kind. Directed edges orient from the step
    /// direction; undirected edges try both ways. Among complete chains,
    /// one terminating exactly at the target kind wins.
    fn bind_chain(
        &self,
        steps: &[&crate::intent::PathStep],
        target_kind: &str,
    ) -> PlanResult<Vec<BoundHop>> {
        let mut chains: Vec<Vec<BoundHop>> = vec![Vec::new()];

        for step in steps {
            let edge = self.edge_kind(&step.edge)?;
            let candidates = orientations(edge, step.direction);
            let mut extended = Vec::new();

            for chain in &chains {
                for hop in &candidates {
                    let continues = chain
                        .last()
                        .map(|prev| prev.to_kind == hop.from_kind)
                        .unwrap_or(true);
                    if continues {
                        let mut next = chain.clone();
                        next.push(hop.clone());
                        extended.push(next);
                    }
                }
            }

            if extended.is_empty() {
                return Err(PlanError::Unsatisfiable(format!(
                    "edge {} cannot continue the path in the requested direction",
                    step.edge
                )));
            }
            chains = extended;
        }

        // Prefer the chain whose terminal kind matches the target exactly.
        let terminal_match = chains
            .iter()
            .position(|chain| chain.last().map(|h| h.to_kind.as_str()) == Some(target_kind));
        match terminal_match {
            Some(index) => Ok(chains.swap_remove(index)),
            None => {
                let terminal = chains[0]
                    .last()
                    .map(|h| h.to_kind.clone())
                    .unwrap_or_default();
                Err(PlanError::Unsatisfiable(format!(
                    "path terminates at kind {terminal}, intent targets {target_kind}"
                )))
            }
        }
    }

    fn bind_predicates<'f>(
        &self,
        filters: impl Iterator<Item = &'f Filter>,
        kind: &NodeKind,
    ) -> PlanResult<Vec<AttrPredicate>> {
        let mut predicates = Vec::new();
        for filter in filters {
            let attr_type = kind.attr_type(&filter.attribute).ok_or_else(|| {
                PlanError::Unsatisfiable(format!(
                    "kind {} has no attribute {}",
                    kind.name, filter.attribute
                ))
            })?;
            if !filter.value.matches_type(attr_type) {
                return Err(PlanError::Unsatisfiable(format!(
                    "filter value {} does not match {}.{}: {}",
                    filter.value, kind.name, filter.attribute, attr_type
                )));
            }
            predicates.push(AttrPredicate {
                attribute: filter.attribute.clone(),
                op: filter.op,
                value: filter.value.clone(),
            });
        }
        Ok(predicates)
    }

    /// Map aggregate-backed ranking signals to the specs the store computes.
    /// Path-local signals (path length, edge weight) need no aggregate.
    fn bind_aggregates(&self, intent: &QueryIntent) -> PlanResult<Vec<(Signal, AggregateSpec)>> {
        let missing = |what: &str| {
            PlanError::Unsatisfiable(format!("no schema binding for {what}"))
        };

        let mut aggregates = Vec::new();
        for criterion in &intent.ranking {
            let spec = match criterion.signal {
                Signal::SharedNeighbors => AggregateSpec::SharedNeighbors,
                Signal::GenreOverlap => AggregateSpec::SharedNeighborsVia {
                    edge: self
                        .bindings
                        .category_edge
                        .clone()
                        .ok_or_else(|| missing("category edge"))?,
                },
                Signal::AverageRating => AggregateSpec::IncidentEdgeMean {
                    edge: self
                        .bindings
                        .rating_edge
                        .clone()
                        .ok_or_else(|| missing("rating edge"))?,
                    attribute: self
                        .bindings
                        .rating_attribute
                        .clone()
                        .ok_or_else(|| missing("rating attribute"))?,
                },
                Signal::RatingOverlap => AggregateSpec::SharedNeighborAttrOverlap {
                    edge: self
                        .bindings
                        .rating_edge
                        .clone()
                        .ok_or_else(|| missing("rating edge"))?,
                    attribute: self
                        .bindings
                        .rating_attribute
                        .clone()
                        .ok_or_else(|| missing("rating attribute"))?,
                    tolerance: RATING_TOLERANCE,
                },
                Signal::Popularity => AggregateSpec::NodeAttr {
                    attribute: self
                        .bindings
                        .popularity_attribute
                        .clone()
                        .ok_or_else(|| missing("popularity attribute"))?,
                },
                Signal::PathLength | Signal::EdgeWeight => continue,
            };
            aggregates.push((criterion.signal, spec));
        }
        Ok(aggregates)
    }
}

/// Orientation candidates for one hop. A directed edge walks the way the
/// step says; an undirected edge may bind either way round.
fn orientations(edge: &EdgeKind, direction: TraverseDirection) -> Vec<BoundHop> {
    let forward = BoundHop {
        edge: edge.name.clone(),
        direction: TraverseDirection::Forward,
        from_kind: edge.source.clone(),
        to_kind: edge.target.clone(),
        undirected: !edge.directed,
        fanout: edge.fanout_hint,
    };
    let reverse = BoundHop {
        edge: edge.name.clone(),
        direction: TraverseDirection::Reverse,
        from_kind: edge.target.clone(),
        to_kind: edge.source.clone(),
        undirected: !edge.directed,
        fanout: edge.fanout_hint,
    };

    if edge.directed {
        match direction {
            TraverseDirection::Forward => vec![forward],
            TraverseDirection::Reverse => vec![reverse],
        }
    } else if edge.source == edge.target {
        vec![forward]
    } else {
        match direction {
            TraverseDirection::Forward => vec![forward, reverse],
            TraverseDirection::Reverse => vec![reverse, forward],
        }
    }
}

/// Max nodes touched: the product of fan-out hints along each traversal,
/// summed; a plan with no traversals scans the target kind.
fn estimate_cost(traversals: &[BoundTraversal], target: &NodeKind) -> u64 {
    if traversals.is_empty() {
        return target.expected_count;
    }
    traversals
        .iter()
        .map(|traversal| {
            traversal
                .hops
                .iter()
                .fold(1u64, |acc, hop| acc.saturating_mul(hop.fanout))
        })
        .fold(0u64, |acc, cost| acc.saturating_add(cost))
}
