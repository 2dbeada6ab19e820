//! Cinegraph Recommendation Engine
//!
//! Turns free-form questions about a movie knowledge graph ("movies
//! similar to Inception that sci-fi fans also liked") into bounded, safe
//! graph queries, executes them against an external property-graph store,
//! and ranks the results into an explainable recommendation.
//!
//! # Architecture
//!
//! One pipeline per request, each stage a pure transformation:
//!
//! Intent Parser → Query Plan Builder → Graph Executor →
//! Recommendation Ranker → Response Composer
//!
//! The language model is used once per request, as a constrained
//! translator behind a closed-vocabulary validation boundary — never as
//! the executor. Everything downstream of the parsed intent is
//! deterministic and testable without any external service.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cinegraph::config::EngineConfig;
//! use cinegraph::exec::memory::MemoryGraph;
//! use cinegraph::intent::client::HttpModel;
//! use cinegraph::pipeline::Engine;
//! use cinegraph::schema::GraphSchema;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let schema = Arc::new(GraphSchema::movielens());
//! let config = EngineConfig::default();
//! let model = Arc::new(HttpModel::new(&config.model)?);
//! let store = Arc::new(MemoryGraph::new());
//!
//! let engine = Engine::new(schema, config, model, store);
//! let payload = engine.recommend("movies similar to Inception", &[]).await?;
//! println!("{}", payload.summary);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod compose;
pub mod config;
pub mod error;
pub mod exec;
pub mod intent;
pub mod pipeline;
pub mod plan;
pub mod rank;
pub mod schema;

// Re-export main types for convenience
pub use compose::{ResponsePayload, Subgraph, SubgraphLink, SubgraphNode};
pub use config::{ConfigError, EngineConfig, RankingProfile, SignalBindings};
pub use error::{EngineError, EngineResult};
pub use exec::{
    EdgeRecord, GraphClient, GraphExecutor, GraphValue, NodeRecord, PathRecord, RawResult,
    ResultRow, StoreFault,
};
pub use intent::{
    ConversationTurn, DepthRange, Filter, FilterAnchor, FilterOp, PathConstraint, PathStep,
    QueryIntent, RankingCriterion, ScalarValue, Signal, SortDirection, TraverseDirection,
};
pub use pipeline::Engine;
pub use plan::{PlanBuilder, QueryPlan};
pub use rank::{ExplanationTrace, RankedItem, Ranker, SignalValue};
pub use schema::{AttrType, EdgeKind, GraphSchema, NodeKind, SchemaError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "1.0.0");
    }
}
