//! Graph execution
//!
//! The executor owns the engine's only contact with the external graph
//! store: one read-only query per request, issued through the `GraphClient`
//! trait under a deadline, with a bounded pool gating concurrency. Transient
//! connectivity faults are retried exactly once; query faults never are.

pub mod memory;

use crate::intent::ScalarValue;
use crate::plan::QueryPlan;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

use crate::config::ExecutorConfig;

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// The store did not answer within the deadline, or no pool slot
    /// became free within the wait timeout
    #[error("graph store did not respond within the deadline")]
    Timeout,

    /// A fault reported by the store
    #[error("graph store error: {0}")]
    Store(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Faults a `GraphClient` may report. The split drives retry policy:
/// transient connectivity faults are retried once, query-correctness
/// faults are surfaced immediately.
#[derive(Error, Debug)]
pub enum StoreFault {
    #[error("transient store fault: {0}")]
    Transient(String),
    #[error("query fault: {0}")]
    Query(String),
}

/// Binding name of the result node in every row
pub const TARGET_BINDING: &str = "target";

/// Binding name of the path evidence for the traversal at `index`
pub fn path_binding(index: usize) -> String {
    format!("path_{index}")
}

/// A node as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub kind: String,
    pub attrs: IndexMap<String, ScalarValue>,
}

impl NodeRecord {
    pub fn attr(&self, name: &str) -> Option<&ScalarValue> {
        self.attrs.get(name)
    }

    /// Human-readable label for summaries and visualization: the first
    /// title- or name-like attribute, falling back to the id.
    pub fn display_label(&self) -> String {
        for key in ["title", "name"] {
            if let Some(ScalarValue::String(s)) = self.attrs.get(key) {
                return s.clone();
            }
        }
        format!("{}#{}", self.kind, self.id)
    }
}

/// An edge as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: u64,
    pub kind: String,
    pub source: u64,
    pub target: u64,
    pub attrs: IndexMap<String, ScalarValue>,
}

impl EdgeRecord {
    pub fn attr(&self, name: &str) -> Option<&ScalarValue> {
        self.attrs.get(name)
    }
}

/// A materialized traversal path: nodes from origin to terminal, with the
/// connecting edges in walk order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl PathRecord {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Value bound to a row variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphValue {
    Node(NodeRecord),
    Edge(EdgeRecord),
    Path(PathRecord),
    Scalar(ScalarValue),
    Null,
}

impl GraphValue {
    pub fn as_node(&self) -> Option<&NodeRecord> {
        match self {
            GraphValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathRecord> {
        match self {
            GraphValue::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            GraphValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view of scalar bindings, used by the ranker
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(|s| s.as_float())
    }
}

/// One result row: ordered mapping from binding name to value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    bindings: IndexMap<String, GraphValue>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self {
            bindings: IndexMap::new(),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: GraphValue) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&GraphValue> {
        self.bindings.get(name)
    }

    pub fn target(&self) -> Option<&NodeRecord> {
        self.get(TARGET_BINDING).and_then(GraphValue::as_node)
    }

    /// All path bindings in traversal order
    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.bindings
            .iter()
            .filter(|(name, _)| name.starts_with("path_"))
            .filter_map(|(_, value)| value.as_path())
    }
}

impl Default for ResultRow {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable result of one plan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub rows: Vec<ResultRow>,
}

impl RawResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read-only client for the external graph store.
///
/// Contract: implementations never mutate the store, and return rows in a
/// stable order (sorted by target node id) so identical plans against an
/// unchanged graph yield identical results.
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn run(&self, plan: &QueryPlan) -> Result<RawResult, StoreFault>;
}

/// Executes validated plans through a bounded connection pool
pub struct GraphExecutor {
    client: Arc<dyn GraphClient>,
    permits: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl GraphExecutor {
    pub fn new(client: Arc<dyn GraphClient>, config: ExecutorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.pool_size));
        Self {
            client,
            permits,
            config,
        }
    }

    /// Run one plan. Blocks for a pool slot up to the acquire timeout,
    /// then runs the store round trip under the query deadline. Dropping
    /// the returned future aborts the in-flight call and frees the slot.
    pub async fn execute(&self, plan: &QueryPlan) -> ExecResult<RawResult> {
        let _permit = timeout(
            Duration::from_millis(self.config.acquire_timeout_ms),
            self.permits.acquire(),
        )
        .await
        .map_err(|_| ExecError::Timeout)?
        .map_err(|_| ExecError::Store("connection pool closed".into()))?;

        match self.round_trip(plan).await {
            Ok(raw) => Ok(raw),
            Err(RoundTripError::Fatal(error)) => Err(error),
            Err(RoundTripError::Transient(fault)) => {
                warn!(fault = %fault, "transient store fault, retrying once");
                match self.round_trip(plan).await {
                    Ok(raw) => Ok(raw),
                    Err(RoundTripError::Fatal(error)) => Err(error),
                    Err(RoundTripError::Transient(fault)) => Err(ExecError::Store(fault)),
                }
            }
        }
    }

    async fn round_trip(&self, plan: &QueryPlan) -> Result<RawResult, RoundTripError> {
        let deadline = Duration::from_millis(self.config.query_timeout_ms);
        match timeout(deadline, self.client.run(plan)).await {
            Err(_) => Err(RoundTripError::Fatal(ExecError::Timeout)),
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(StoreFault::Query(message))) => {
                Err(RoundTripError::Fatal(ExecError::Store(message)))
            }
            Ok(Err(StoreFault::Transient(message))) => Err(RoundTripError::Transient(message)),
        }
    }
}

enum RoundTripError {
    Transient(String),
    Fatal(ExecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_plan() -> QueryPlan {
        QueryPlan {
            target_kind: "Movie".into(),
            traversals: vec![],
            target_predicates: vec![],
            aggregates: vec![],
            exclude_origins: false,
            row_cap: 100,
            cost_estimate: 1,
        }
    }

    struct FlakyClient {
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphClient for FlakyClient {
        async fn run(&self, _plan: &QueryPlan) -> Result<RawResult, StoreFault> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(StoreFault::Transient("connection reset".into()))
            } else {
                Ok(RawResult { rows: vec![] })
            }
        }
    }

    struct BrokenQueryClient;

    #[async_trait]
    impl GraphClient for BrokenQueryClient {
        async fn run(&self, _plan: &QueryPlan) -> Result<RawResult, StoreFault> {
            Err(StoreFault::Query("unknown traversal operator".into()))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl GraphClient for SlowClient {
        async fn run(&self, _plan: &QueryPlan) -> Result<RawResult, StoreFault> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RawResult { rows: vec![] })
        }
    }

    #[tokio::test]
    async fn test_single_transient_fault_is_retried() {
        let client = Arc::new(FlakyClient {
            failures_before_success: 1,
            calls: AtomicUsize::new(0),
        });
        let executor = GraphExecutor::new(client.clone(), ExecutorConfig::default());
        assert!(executor.execute(&empty_plan()).await.is_ok());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_fault_surfaces() {
        let client = Arc::new(FlakyClient {
            failures_before_success: 5,
            calls: AtomicUsize::new(0),
        });
        let executor = GraphExecutor::new(client.clone(), ExecutorConfig::default());
        let err = executor.execute(&empty_plan()).await.unwrap_err();
        assert!(matches!(err, ExecError::Store(_)));
        // exactly one retry, no more
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_fault_is_not_retried() {
        let client = Arc::new(BrokenQueryClient);
        let executor = GraphExecutor::new(client, ExecutorConfig::default());
        let err = executor.execute(&empty_plan()).await.unwrap_err();
        assert!(matches!(err, ExecError::Store(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_hits_deadline() {
        let config = ExecutorConfig {
            pool_size: 1,
            acquire_timeout_ms: 100,
            query_timeout_ms: 200,
        };
        let executor = GraphExecutor::new(Arc::new(SlowClient), config);
        let err = executor.execute(&empty_plan()).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout));
    }
}
