//! Plan-level properties: cost bounds, depth bounds, conjunctive path
//! semantics, and constraint satisfiability, exercised through the public
//! engine surface.

use cinegraph::config::{EngineConfig, PlannerConfig, SignalBindings};
use cinegraph::exec::memory::MemoryGraph;
use cinegraph::intent::client::{IntentModel, ModelError, ModelResult};
use cinegraph::intent::{
    DepthRange, Filter, FilterAnchor, FilterOp, PathConstraint, PathStep, QueryIntent,
    RankingCriterion, Signal, TraverseDirection,
};
use cinegraph::pipeline::Engine;
use cinegraph::plan::{PlanBuilder, PlanError};
use cinegraph::schema::GraphSchema;
use cinegraph::EngineError;
use async_trait::async_trait;
use std::sync::Arc;

struct NoModel;

#[async_trait]
impl IntentModel for NoModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> ModelResult<String> {
        Err(ModelError::Api("model not expected in this test".into()))
    }
}

fn rated_path(direction_pair: (TraverseDirection, TraverseDirection)) -> PathConstraint {
    PathConstraint {
        steps: vec![
            PathStep {
                edge: "RATED".into(),
                direction: direction_pair.0,
            },
            PathStep {
                edge: "RATED".into(),
                direction: direction_pair.1,
            },
        ],
        depth: DepthRange::exact(2),
    }
}

fn title_filter(title: &str, anchor: FilterAnchor) -> Filter {
    Filter {
        attribute: "title".into(),
        op: FilterOp::Eq,
        value: title.into(),
        anchor,
    }
}

fn co_rating_intent(title: &str) -> QueryIntent {
    QueryIntent {
        target: "Movie".into(),
        filters: vec![title_filter(title, FilterAnchor::PathStart(0))],
        paths: vec![rated_path((
            TraverseDirection::Reverse,
            TraverseDirection::Forward,
        ))],
        ranking: vec![RankingCriterion::new(Signal::SharedNeighbors, 1.0)],
        limit: 10,
    }
}

#[test]
fn test_accepted_plans_stay_under_ceiling() {
    let schema = GraphSchema::movielens();
    let bindings = SignalBindings::default();

    // Across a spread of ceilings, the builder either produces a plan
    // within the ceiling or rejects; it never truncates a path to fit.
    for ceiling in [10, 1_000, 10_000, 100_000_000] {
        let config = PlannerConfig {
            max_depth: 4,
            cost_ceiling: ceiling,
        };
        let builder = PlanBuilder::new(&schema, &config, &bindings);
        match builder.build(&co_rating_intent("Inception")) {
            Ok(plan) => {
                assert!(plan.cost_estimate <= ceiling);
                assert_eq!(plan.traversals[0].depth(), 2);
            }
            Err(error) => assert!(matches!(error, PlanError::TooExpensive(_))),
        }
    }
}

#[test]
fn test_depth_round_trip_never_exceeds_range() {
    let schema = GraphSchema::movielens();
    let config = PlannerConfig::default();
    let bindings = SignalBindings::default();

    let mut intent = co_rating_intent("Inception");
    intent.paths[0].depth = DepthRange::new(1, 2);

    let plan = PlanBuilder::new(&schema, &config, &bindings)
        .build(&intent)
        .unwrap();
    assert!(plan.traversals[0].depth() <= 2);
}

/// Two movies, each with its own co-rating constraint: results must
/// satisfy both ("movies liked by people who liked X *and* Y").
#[tokio::test]
async fn test_multiple_paths_intersect_on_target() {
    let mut g = MemoryGraph::new();
    let titles = ["Inception", "The Matrix", "Memento", "Interstellar"];
    let movies: Vec<u64> = titles
        .iter()
        .map(|title| {
            let id = g.create_node("Movie");
            g.set_node_attr(id, "title", *title).unwrap();
            id
        })
        .collect();

    // u1 links Inception->Matrix, u2 links Memento->Matrix,
    // u3 links Inception->Interstellar only
    let ratings: &[&[usize]] = &[&[0, 1], &[2, 1], &[0, 3]];
    for rated in ratings {
        let user = g.create_node("User");
        for index in *rated {
            let edge = g.create_edge(user, movies[*index], "RATED").unwrap();
            g.set_edge_attr(edge, "rating", 4.0).unwrap();
        }
    }

    let engine = Engine::new(
        Arc::new(GraphSchema::movielens()),
        EngineConfig::default(),
        Arc::new(NoModel),
        Arc::new(g),
    );

    let intent = QueryIntent {
        target: "Movie".into(),
        filters: vec![
            title_filter("Inception", FilterAnchor::PathStart(0)),
            title_filter("Memento", FilterAnchor::PathStart(1)),
        ],
        paths: vec![
            rated_path((TraverseDirection::Reverse, TraverseDirection::Forward)),
            rated_path((TraverseDirection::Reverse, TraverseDirection::Forward)),
        ],
        ranking: vec![RankingCriterion::new(Signal::SharedNeighbors, 1.0)],
        limit: 10,
    };

    let payload = engine.run_intent(intent).await.unwrap();
    let titles: Vec<String> = payload
        .items
        .iter()
        .map(|item| item.node.display_label())
        .collect();
    // Interstellar is co-rated with Inception but not with Memento
    assert_eq!(titles, vec!["The Matrix"]);
}

#[tokio::test]
async fn test_filter_on_absent_attribute_is_unsatisfiable() {
    let engine = Engine::new(
        Arc::new(GraphSchema::movielens()),
        EngineConfig::default(),
        Arc::new(NoModel),
        Arc::new(MemoryGraph::new()),
    );

    let mut intent = co_rating_intent("Inception");
    intent
        .filters
        .push(title_filter("whatever", FilterAnchor::Target));
    intent.filters[1].attribute = "box_office".into();

    let err = engine.run_intent(intent).await.unwrap_err();
    assert!(matches!(err, EngineError::UnsatisfiableConstraint(_)));
}

#[test]
fn test_mismatched_value_type_is_unsatisfiable() {
    let schema = GraphSchema::movielens();
    let config = PlannerConfig::default();
    let bindings = SignalBindings::default();

    let mut intent = co_rating_intent("Inception");
    // year is an integer attribute; a string value cannot satisfy it
    intent.filters.push(Filter {
        attribute: "year".into(),
        op: FilterOp::Eq,
        value: "nineteen ninety-five".into(),
        anchor: FilterAnchor::Target,
    });

    let err = PlanBuilder::new(&schema, &config, &bindings)
        .build(&intent)
        .unwrap_err();
    assert!(matches!(err, PlanError::Unsatisfiable(_)));
}
