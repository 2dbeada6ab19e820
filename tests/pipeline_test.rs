//! End-to-end pipeline tests against the in-memory store, with the
//! language model scripted through the `IntentModel` trait.

use async_trait::async_trait;
use cinegraph::config::EngineConfig;
use cinegraph::exec::memory::MemoryGraph;
use cinegraph::intent::client::{IntentModel, ModelError, ModelResult};
use cinegraph::intent::{
    DepthRange, Filter, FilterAnchor, FilterOp, PathConstraint, PathStep, QueryIntent,
    RankingCriterion, Signal, TraverseDirection,
};
use cinegraph::pipeline::Engine;
use cinegraph::schema::GraphSchema;
use cinegraph::EngineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scripted stand-in for the language model
struct ScriptedModel {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentModel for ScriptedModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> ModelResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| ModelError::Api("no scripted reply".into()))
    }
}

/// Movies co-rated with Inception by overlapping user sets.
///
/// The Matrix shares three raters with Inception, Interstellar two,
/// Memento one; Heat shares none.
fn sample_graph() -> MemoryGraph {
    let mut g = MemoryGraph::new();

    let titles = ["Inception", "The Matrix", "Interstellar", "Memento", "Heat"];
    let movies: Vec<u64> = titles
        .iter()
        .map(|title| {
            let id = g.create_node("Movie");
            g.set_node_attr(id, "title", *title).unwrap();
            id
        })
        .collect();

    // Each row: movies rated by one user (index into `movies`)
    let users: &[&[usize]] = &[
        &[0, 1, 2],    // u1: Inception, Matrix, Interstellar
        &[0, 1],       // u2: Inception, Matrix
        &[0, 1, 3],    // u3: Inception, Matrix, Memento
        &[0, 2],       // u4: Inception, Interstellar
        &[4],          // u5: Heat only
    ];
    for rated in users {
        let user = g.create_node("User");
        for index in *rated {
            let edge = g.create_edge(user, movies[*index], "RATED").unwrap();
            g.set_edge_attr(edge, "rating", 4.0).unwrap();
        }
    }

    g
}

fn similar_to_inception(limit: usize) -> QueryIntent {
    QueryIntent {
        target: "Movie".into(),
        filters: vec![Filter {
            attribute: "title".into(),
            op: FilterOp::Eq,
            value: "Inception".into(),
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
        limit,
    }
}

fn engine_with(model: Arc<dyn IntentModel>) -> Engine {
    Engine::new(
        Arc::new(GraphSchema::movielens()),
        EngineConfig::default(),
        model,
        Arc::new(sample_graph()),
    )
}

fn engine() -> Engine {
    engine_with(Arc::new(ScriptedModel::new(&[])))
}

#[tokio::test]
async fn test_co_rating_overlap_ranks_first() {
    let payload = engine().run_intent(similar_to_inception(10)).await.unwrap();

    let titles: Vec<String> = payload
        .items
        .iter()
        .map(|item| item.node.display_label())
        .collect();
    // Highest co-rated-user overlap wins; the source movie is excluded
    assert_eq!(titles[0], "The Matrix");
    assert_eq!(titles[1], "Interstellar");
    assert_eq!(titles[2], "Memento");
    assert!(!titles.contains(&"Inception".to_string()));
    assert!(!titles.contains(&"Heat".to_string()));
}

#[tokio::test]
async fn test_explanations_carry_evidence() {
    let payload = engine().run_intent(similar_to_inception(10)).await.unwrap();

    let top = &payload.items[0];
    assert_eq!(top.trace.dominant, Some(Signal::SharedNeighbors));
    assert!(!top.trace.paths.is_empty());
    assert_eq!(top.trace.paths[0].len(), 2);
    assert!(payload.summary.contains("The Matrix"));
    assert!(payload.summary.contains("3 shared raters"));
}

#[tokio::test]
async fn test_subgraph_covers_evidence_paths() {
    let payload = engine().run_intent(similar_to_inception(10)).await.unwrap();

    // Inception appears as context, results as results
    let inception = payload
        .subgraph
        .nodes
        .iter()
        .find(|node| node.label == "Inception")
        .unwrap();
    assert_eq!(inception.group, "context");
    let matrix = payload
        .subgraph
        .nodes
        .iter()
        .find(|node| node.label == "The Matrix")
        .unwrap();
    assert_eq!(matrix.group, "result");
    assert!(!payload.subgraph.links.is_empty());
}

#[tokio::test]
async fn test_zero_limit_yields_empty_payload() {
    let payload = engine().run_intent(similar_to_inception(0)).await.unwrap();
    assert!(payload.items.is_empty());
    assert!(payload.subgraph.nodes.is_empty());
}

#[tokio::test]
async fn test_identical_intent_yields_identical_payload() {
    let engine = engine();
    let first = engine.run_intent(similar_to_inception(10)).await.unwrap();
    let second = engine.run_intent(similar_to_inception(10)).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_default_ranking_profile_applies() {
    let mut intent = similar_to_inception(10);
    intent.ranking.clear();
    let payload = engine().run_intent(intent).await.unwrap();

    assert!(!payload.items.is_empty());
    // Defaults include collaborative signals; the top item must carry them
    assert!(payload.items[0]
        .signals
        .iter()
        .any(|signal| signal.signal == Signal::SharedNeighbors));
    assert_eq!(payload.items[0].node.display_label(), "The Matrix");
}

#[tokio::test]
async fn test_undeclared_edge_fails_after_one_retry() {
    // The model insists on an edge kind the schema does not declare
    let reply = r#"{"target": "Movie",
                    "paths": [{"steps": [{"edge": "DIRECTED_BY"}],
                               "depth": {"min": 1, "max": 1}}],
                    "limit": 5}"#;
    let model = Arc::new(ScriptedModel::new(&[reply, reply]));
    let engine = engine_with(model.clone());

    let err = engine
        .recommend("movies directed by Christopher Nolan", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedIntent(_)));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_natural_language_round_trip_with_scripted_model() {
    let reply = r#"{
        "target": "Movie",
        "filters": [{"attribute": "title", "op": "eq", "value": "Inception",
                     "anchor": {"path_start": 0}}],
        "paths": [{"steps": [{"edge": "RATED", "direction": "reverse"},
                             {"edge": "RATED", "direction": "forward"}],
                   "depth": {"min": 2, "max": 2}}],
        "ranking": [{"signal": "shared_neighbors", "weight": 1.0}],
        "limit": 10
    }"#;
    let engine = engine_with(Arc::new(ScriptedModel::new(&[reply])));

    let payload = engine
        .recommend("movies similar to Inception", &[])
        .await
        .unwrap();
    assert_eq!(payload.items[0].node.display_label(), "The Matrix");
    // The intent is echoed for follow-up turns
    assert_eq!(payload.intent.target, "Movie");
}

#[tokio::test]
async fn test_depth_range_beyond_max_is_too_expensive() {
    let mut intent = similar_to_inception(10);
    intent.paths[0].depth = DepthRange::new(1, 10);
    let err = engine().run_intent(intent).await.unwrap_err();
    assert!(matches!(err, EngineError::PlanTooExpensive(_)));
}

#[tokio::test]
async fn test_no_matches_is_ranking_unavailable() {
    let mut intent = similar_to_inception(10);
    intent.filters[0].value = "No Such Film".into();
    let err = engine().run_intent(intent).await.unwrap_err();
    assert!(matches!(err, EngineError::RankingUnavailable));
}
