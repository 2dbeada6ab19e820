//! Request pipeline
//!
//! Wires the stages together: parse → plan → execute → rank → compose.
//! Each stage is a pure transformation of the previous stage's output;
//! requests share nothing but the read-only schema and the store pool.

use crate::compose::{compose, ResponsePayload};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::exec::{GraphClient, GraphExecutor};
use crate::intent::client::IntentModel;
use crate::intent::parser::IntentParser;
use crate::intent::{ConversationTurn, QueryIntent, RankingCriterion};
use crate::plan::PlanBuilder;
use crate::rank::Ranker;
use crate::schema::GraphSchema;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// The query-intent translation and recommendation engine
pub struct Engine {
    schema: Arc<GraphSchema>,
    config: EngineConfig,
    parser: IntentParser,
    executor: GraphExecutor,
}

impl Engine {
    pub fn new(
        schema: Arc<GraphSchema>,
        config: EngineConfig,
        model: Arc<dyn IntentModel>,
        store: Arc<dyn GraphClient>,
    ) -> Self {
        let parser = IntentParser::new(
            model,
            schema.clone(),
            config.limits.clone(),
            config.ranking.bindings.clone(),
        );
        let executor = GraphExecutor::new(store, config.executor.clone());
        Self {
            schema,
            config,
            parser,
            executor,
        }
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }

    /// Answer a natural-language request.
    ///
    /// The one model call happens here; everything after the parsed intent
    /// is deterministic. Dropping the returned future cancels any in-flight
    /// model or store call.
    pub async fn recommend(
        &self,
        text: &str,
        history: &[ConversationTurn],
    ) -> EngineResult<ResponsePayload> {
        let request_id = Uuid::new_v4();
        let span = info_span!("recommend", %request_id);
        async {
            let intent = self.parser.parse(text, history).await?;
            self.run_intent(intent).await
        }
        .instrument(span)
        .await
    }

    /// Run an already-structured intent through the deterministic part of
    /// the pipeline. Callers holding structured parameters (and the test
    /// suite) enter here, bypassing the model entirely.
    pub async fn run_intent(&self, mut intent: QueryIntent) -> EngineResult<ResponsePayload> {
        intent
            .validate(&self.schema, &self.config.ranking.bindings)?;

        if intent.ranking.is_empty() {
            intent.ranking = self.default_ranking(&intent);
        }

        if intent.limit == 0 {
            return Ok(ResponsePayload::empty(intent));
        }

        let plan = PlanBuilder::new(
            &self.schema,
            &self.config.planner,
            &self.config.ranking.bindings,
        )
        .build(&intent)?;

        let raw = self.executor.execute(&plan).await?;
        info!(rows = raw.len(), cost = plan.cost_estimate, "plan executed");

        let items = Ranker::new(&self.config.ranking).rank(&raw, &intent.ranking, intent.limit)?;
        Ok(compose(&intent, items))
    }

    /// Profile defaults, filtered to the signals this intent and schema can
    /// actually compute. Unmappable defaults are skipped — the caller did
    /// not ask for them.
    fn default_ranking(&self, intent: &QueryIntent) -> Vec<RankingCriterion> {
        self.config
            .ranking
            .defaults
            .iter()
            .filter(|criterion| {
                let mut probe = intent.clone();
                probe.ranking = vec![(*criterion).clone()];
                probe
                    .validate(&self.schema, &self.config.ranking.bindings)
                    .is_ok()
            })
            .cloned()
            .collect()
    }
}
