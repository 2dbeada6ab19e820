//! Query intent model
//!
//! A `QueryIntent` is the structured form of a natural-language request:
//! target node kind, filters, bounded path constraints, ranking criteria and
//! a result limit. The language model produces intents as JSON; everything
//! in an intent is validated against the graph schema's closed vocabulary
//! before it is allowed anywhere near the plan builder.

pub mod client;
pub mod parser;

use crate::config::SignalBindings;
use crate::schema::{AttrType, GraphSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Intent-stage errors
#[derive(Error, Debug)]
pub enum IntentError {
    /// Required slots (target kind, at least one filter or path) could not
    /// be resolved from the request
    #[error("ambiguous intent: {0}")]
    Ambiguous(String),

    /// The request names a kind, edge, operator or ranking signal the
    /// schema cannot satisfy
    #[error("unsupported intent: {0}")]
    Unsupported(String),

    /// The language model could not be reached
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type IntentResult<T> = Result<T, IntentError>;

/// Scalar attribute value appearing in filters and result rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(f) => Some(*f),
            ScalarValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value can populate an attribute of the given type.
    /// Integers are accepted where floats are declared.
    pub fn matches_type(&self, ty: AttrType) -> bool {
        matches!(
            (self, ty),
            (ScalarValue::String(_), AttrType::String)
                | (ScalarValue::Integer(_), AttrType::Integer)
                | (ScalarValue::Integer(_), AttrType::Float)
                | (ScalarValue::Float(_), AttrType::Float)
                | (ScalarValue::Boolean(_), AttrType::Boolean)
        )
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "\"{}\"", s),
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Float(fl) => write!(f, "{}", fl),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        ScalarValue::Integer(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(f: f64) -> Self {
        ScalarValue::Float(f)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Boolean(b)
    }
}

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-insensitive substring match on string attributes
    Contains,
}

/// Which binding a filter constrains
///
/// "Movies similar to Inception" filters the traversal *origin* (the movie
/// named Inception), not the result set, so filters carry an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAnchor {
    /// The result binding (the intent's target kind)
    Target,
    /// The origin of the path constraint at this index
    PathStart(usize),
}

impl Default for FilterAnchor {
    fn default() -> Self {
        FilterAnchor::Target
    }
}

/// Attribute predicate: attribute, operator, value, anchored binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub attribute: String,
    pub op: FilterOp,
    pub value: ScalarValue,
    #[serde(default)]
    pub anchor: FilterAnchor,
}

/// Traversal direction relative to an edge kind's declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraverseDirection {
    /// Declared source towards declared target
    Forward,
    /// Declared target towards declared source
    Reverse,
}

/// One hop of a path constraint: an edge kind and a direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub edge: String,
    #[serde(default = "default_direction")]
    pub direction: TraverseDirection,
}

fn default_direction() -> TraverseDirection {
    TraverseDirection::Forward
}

/// Inclusive traversal depth range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: u32,
    pub max: u32,
}

impl DepthRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Exact depth
    pub fn exact(depth: u32) -> Self {
        Self {
            min: depth,
            max: depth,
        }
    }
}

/// A bounded sequence of edge kinds describing an allowed traversal shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConstraint {
    pub steps: Vec<PathStep>,
    pub depth: DepthRange,
}

/// Ranking signal names the engine knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Distinct intermediate nodes connecting origin and result
    SharedNeighbors,
    /// Mean rating over the result's incident rating edges
    AverageRating,
    /// Shared raters whose two ratings agree closely
    RatingOverlap,
    /// Hops taken to reach the result (shorter is better)
    PathLength,
    /// Mean weight attribute along the connecting path
    EdgeWeight,
    /// Categories shared between origin and result
    GenreOverlap,
    /// The result's popularity attribute
    Popularity,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::SharedNeighbors => "shared_neighbors",
            Signal::AverageRating => "average_rating",
            Signal::RatingOverlap => "rating_overlap",
            Signal::PathLength => "path_length",
            Signal::EdgeWeight => "edge_weight",
            Signal::GenreOverlap => "genre_overlap",
            Signal::Popularity => "popularity",
        }
    }

    pub fn all() -> &'static [Signal] {
        &[
            Signal::SharedNeighbors,
            Signal::AverageRating,
            Signal::RatingOverlap,
            Signal::PathLength,
            Signal::EdgeWeight,
            Signal::GenreOverlap,
            Signal::Popularity,
        ]
    }

    /// Signals that are computed from the connecting path and therefore
    /// require at least one path constraint in the intent
    pub fn needs_path(&self) -> bool {
        matches!(
            self,
            Signal::SharedNeighbors
                | Signal::RatingOverlap
                | Signal::PathLength
                | Signal::EdgeWeight
                | Signal::GenreOverlap
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether higher or lower raw values rank better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

fn default_sort() -> SortDirection {
    SortDirection::Descending
}

/// One weighted ranking signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingCriterion {
    pub signal: Signal,
    pub weight: f64,
    #[serde(default = "default_sort")]
    pub direction: SortDirection,
}

impl RankingCriterion {
    pub fn new(signal: Signal, weight: f64) -> Self {
        let direction = match signal {
            Signal::PathLength => SortDirection::Ascending,
            _ => SortDirection::Descending,
        };
        Self {
            signal,
            weight,
            direction,
        }
    }
}

/// Structured form of one natural-language request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Target node kind name
    pub target: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub paths: Vec<PathConstraint>,
    #[serde(default)]
    pub ranking: Vec<RankingCriterion>,
    pub limit: usize,
}

impl QueryIntent {
    /// Validate this intent against the schema's closed vocabulary and the
    /// configured signal bindings.
    ///
    /// This is the safety boundary between the language model and the rest
    /// of the pipeline: nothing the model invented survives past here.
    pub fn validate(
        &self,
        schema: &GraphSchema,
        bindings: &SignalBindings,
    ) -> IntentResult<()> {
        if self.target.is_empty() {
            return Err(IntentError::Ambiguous("no target kind resolved".into()));
        }
        let target = schema.node_kind(&self.target).ok_or_else(|| {
            IntentError::Unsupported(format!("undeclared node kind {}", self.target))
        })?;

        if self.filters.is_empty() && self.paths.is_empty() {
            return Err(IntentError::Ambiguous(
                "intent has neither filters nor path constraints".into(),
            ));
        }

        for constraint in &self.paths {
            if constraint.steps.is_empty() {
                return Err(IntentError::Ambiguous(
                    "path constraint has no steps".into(),
                ));
            }
            if constraint.depth.min == 0 || constraint.depth.min > constraint.depth.max {
                return Err(IntentError::Ambiguous(format!(
                    "invalid depth range [{}, {}]",
                    constraint.depth.min, constraint.depth.max
                )));
            }
            for step in &constraint.steps {
                if schema.edge_kind(&step.edge).is_none() {
                    return Err(IntentError::Unsupported(format!(
                        "undeclared edge kind {}",
                        step.edge
                    )));
                }
            }
        }

        for filter in &self.filters {
            if let FilterAnchor::PathStart(index) = filter.anchor {
                if index >= self.paths.len() {
                    return Err(IntentError::Ambiguous(format!(
                        "filter on {} anchored to undeclared path {}",
                        filter.attribute, index
                    )));
                }
            }
        }

        for criterion in &self.ranking {
            self.check_signal_mapping(criterion.signal, target.name.as_str(), schema, bindings)?;
        }

        Ok(())
    }

    /// A ranking criterion is only supported when the schema carries the
    /// edges/attributes its signal is computed from.
    fn check_signal_mapping(
        &self,
        signal: Signal,
        target_kind: &str,
        schema: &GraphSchema,
        bindings: &SignalBindings,
    ) -> IntentResult<()> {
        let unmapped =
            |signal: Signal| IntentError::Unsupported(format!("{signal} has no schema mapping"));

        if signal.needs_path() && self.paths.is_empty() {
            return Err(IntentError::Unsupported(format!(
                "{signal} requires a path constraint"
            )));
        }

        match signal {
            Signal::SharedNeighbors | Signal::PathLength => Ok(()),
            Signal::AverageRating | Signal::RatingOverlap => {
                let edge_name = bindings.rating_edge.as_deref().ok_or(unmapped(signal))?;
                let attr = bindings
                    .rating_attribute
                    .as_deref()
                    .ok_or(unmapped(signal))?;
                let edge = schema.edge_kind(edge_name).ok_or(unmapped(signal))?;
                let touches_target = edge.source == target_kind || edge.target == target_kind;
                if !touches_target || !edge.attributes.contains_key(attr) {
                    return Err(unmapped(signal));
                }
                Ok(())
            }
            Signal::GenreOverlap => {
                let edge_name = bindings.category_edge.as_deref().ok_or(unmapped(signal))?;
                let edge = schema.edge_kind(edge_name).ok_or(unmapped(signal))?;
                if edge.source != target_kind && edge.target != target_kind {
                    return Err(unmapped(signal));
                }
                Ok(())
            }
            Signal::EdgeWeight => {
                let attr = bindings
                    .weight_attribute
                    .as_deref()
                    .ok_or(unmapped(signal))?;
                let carried = self.paths.iter().flat_map(|p| &p.steps).any(|step| {
                    schema
                        .edge_kind(&step.edge)
                        .map(|e| e.attributes.contains_key(attr))
                        .unwrap_or(false)
                });
                if !carried {
                    return Err(unmapped(signal));
                }
                Ok(())
            }
            Signal::Popularity => {
                let attr = bindings
                    .popularity_attribute
                    .as_deref()
                    .ok_or(unmapped(signal))?;
                let target = schema.node_kind(target_kind).ok_or(unmapped(signal))?;
                if !target.has_attribute(attr) {
                    return Err(unmapped(signal));
                }
                Ok(())
            }
        }
    }
}

/// One prior conversation turn, supplied by the caller for follow-ups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub intent: QueryIntent,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalBindings;

    fn intent_similar_to(title: &str) -> QueryIntent {
        QueryIntent {
            target: "Movie".into(),
            filters: vec![Filter {
                attribute: "title".into(),
                op: FilterOp::Eq,
                value: title.into(),
                anchor: FilterAnchor::PathStart(0),
            }],
            paths: vec![PathConstraint {
                steps: vec![
                    PathStep {
                        edge: "RATED".into(),
                        direction: TraverseDirection::Reverse,
                    },
                    PathStep {
                        edge: "RATED".into(),
                        direction: TraverseDirection::Forward,
                    },
                ],
                depth: DepthRange::exact(2),
            }],
            ranking: vec![RankingCriterion::new(Signal::SharedNeighbors, 1.0)],
            limit: 10,
        }
    }

    #[test]
    fn test_valid_intent_passes() {
        let schema = GraphSchema::movielens();
        let intent = intent_similar_to("Inception");
        assert!(intent
            .validate(&schema, &SignalBindings::default())
            .is_ok());
    }

    #[test]
    fn test_undeclared_edge_is_unsupported() {
        let schema = GraphSchema::movielens();
        let mut intent = intent_similar_to("Inception");
        intent.paths[0].steps[0].edge = "DIRECTED_BY".into();
        let err = intent
            .validate(&schema, &SignalBindings::default())
            .unwrap_err();
        assert!(matches!(err, IntentError::Unsupported(_)));
    }

    #[test]
    fn test_missing_slots_are_ambiguous() {
        let schema = GraphSchema::movielens();
        let intent = QueryIntent {
            target: "Movie".into(),
            filters: vec![],
            paths: vec![],
            ranking: vec![],
            limit: 10,
        };
        let err = intent
            .validate(&schema, &SignalBindings::default())
            .unwrap_err();
        assert!(matches!(err, IntentError::Ambiguous(_)));
    }

    #[test]
    fn test_unmapped_signal_is_unsupported() {
        let schema = GraphSchema::movielens();
        let mut intent = intent_similar_to("Inception");
        intent.ranking = vec![RankingCriterion::new(Signal::AverageRating, 1.0)];
        let mut bindings = SignalBindings::default();
        bindings.rating_edge = None;
        let err = intent.validate(&schema, &bindings).unwrap_err();
        assert!(matches!(err, IntentError::Unsupported(_)));
    }

    #[test]
    fn test_scalar_type_compat() {
        assert!(ScalarValue::Integer(1995).matches_type(AttrType::Integer));
        assert!(ScalarValue::Integer(4).matches_type(AttrType::Float));
        assert!(!ScalarValue::String("x".into()).matches_type(AttrType::Float));
    }
}
