//! Query plans
//!
//! A `QueryPlan` is a path constraint bound to concrete schema edges: every
//! hop knows its edge kind, direction and endpoint kinds, every predicate
//! is anchored to a kind that actually carries the attribute, and the whole
//! plan carries a cost estimate checked against the configured ceiling
//! before anything reaches the store.

pub mod builder;

pub use builder::PlanBuilder;

use crate::intent::{FilterOp, ScalarValue, Signal, TraverseDirection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Planning errors
#[derive(Error, Debug)]
pub enum PlanError {
    /// The plan would touch more of the graph than the ceiling allows,
    /// or its depth range reaches past the configured maximum
    #[error("plan too expensive: {0}")]
    TooExpensive(String),

    /// Filters or path constraints contradict the schema
    #[error("unsatisfiable constraint: {0}")]
    Unsatisfiable(String),
}

pub type PlanResult<T> = Result<T, PlanError>;

/// A predicate bound to a concrete kind's attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrPredicate {
    pub attribute: String,
    pub op: FilterOp,
    pub value: ScalarValue,
}

impl AttrPredicate {
    /// Evaluate against an attribute value. String equality and substring
    /// matching are case-insensitive; ordering operators apply to numbers
    /// only. A missing attribute never matches.
    pub fn matches(&self, value: Option<&ScalarValue>) -> bool {
        let Some(value) = value else { return false };
        match self.op {
            FilterOp::Eq => scalar_eq(value, &self.value),
            FilterOp::Ne => !scalar_eq(value, &self.value),
            FilterOp::Contains => match (value.as_str(), self.value.as_str()) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                match (value.as_float(), self.value.as_float()) {
                    (Some(lhs), Some(rhs)) => match self.op {
                        FilterOp::Lt => lhs < rhs,
                        FilterOp::Le => lhs <= rhs,
                        FilterOp::Gt => lhs > rhs,
                        _ => lhs >= rhs,
                    },
                    _ => false,
                }
            }
        }
    }
}

fn scalar_eq(lhs: &ScalarValue, rhs: &ScalarValue) -> bool {
    match (lhs, rhs) {
        (ScalarValue::String(a), ScalarValue::String(b)) => a.eq_ignore_ascii_case(b),
        (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a == b,
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// One traversal hop bound to a schema edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundHop {
    pub edge: String,
    pub direction: TraverseDirection,
    pub from_kind: String,
    pub to_kind: String,
    /// Whether the underlying edge kind may be walked from either end
    pub undirected: bool,
    pub fanout: u64,
}

/// A bound traversal: seeded at the origin kind, walking the hops in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundTraversal {
    pub origin_kind: String,
    pub origin_predicates: Vec<AttrPredicate>,
    pub hops: Vec<BoundHop>,
}

impl BoundTraversal {
    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    pub fn terminal_kind(&self) -> &str {
        self.hops
            .last()
            .map(|hop| hop.to_kind.as_str())
            .unwrap_or(self.origin_kind.as_str())
    }
}

/// An aggregate the store computes per result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateSpec {
    /// Distinct intermediate nodes over the traversal paths into the result
    SharedNeighbors,
    /// Common neighbors of origin and result over one named edge kind
    SharedNeighborsVia { edge: String },
    /// Mean of an attribute over the result's incident edges of one kind
    IncidentEdgeMean { edge: String, attribute: String },
    /// Shared neighbors whose two edge-attribute values agree within the
    /// tolerance (rating overlap)
    SharedNeighborAttrOverlap {
        edge: String,
        attribute: String,
        tolerance: f64,
    },
    /// An attribute read off the result node itself
    NodeAttr { attribute: String },
}

/// A validated, bounded, executable traversal specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub target_kind: String,
    /// Multiple traversals intersect on the result binding
    pub traversals: Vec<BoundTraversal>,
    pub target_predicates: Vec<AttrPredicate>,
    /// Aggregates keyed by the ranking signal they feed
    pub aggregates: Vec<(Signal, AggregateSpec)>,
    /// Drop result nodes that seeded a traversal of the same kind
    /// ("movies similar to Inception" must not return Inception)
    pub exclude_origins: bool,
    /// Upper bound on rows returned; overfetched past the intent limit so
    /// the ranker can drop low scorers without starving the response
    pub row_cap: usize,
    /// Estimated maximum nodes touched
    pub cost_estimate: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(op: FilterOp, value: ScalarValue) -> AttrPredicate {
        AttrPredicate {
            attribute: "x".into(),
            op,
            value,
        }
    }

    #[test]
    fn test_eq_is_case_insensitive_for_strings() {
        let p = pred(FilterOp::Eq, "Inception".into());
        assert!(p.matches(Some(&"inception".into())));
        assert!(!p.matches(Some(&"Interstellar".into())));
    }

    #[test]
    fn test_numeric_comparison_coerces_integers() {
        let p = pred(FilterOp::Ge, ScalarValue::Float(4.0));
        assert!(p.matches(Some(&ScalarValue::Integer(4))));
        assert!(!p.matches(Some(&ScalarValue::Float(3.5))));
    }

    #[test]
    fn test_missing_attribute_never_matches() {
        let p = pred(FilterOp::Ne, "anything".into());
        assert!(!p.matches(None));
    }

    #[test]
    fn test_contains_is_substring_match() {
        let p = pred(FilterOp::Contains, "dark".into());
        assert!(p.matches(Some(&"The Dark Knight".into())));
        assert!(!p.matches(Some(&"Inception".into())));
    }
}
