//! Natural-language intent parsing
//!
//! One model call per request: the prompt carries the schema as a closed
//! vocabulary, the model answers with a JSON intent document, and the reply
//! is validated against that vocabulary before anything accepts it. An
//! invalid reply earns exactly one corrective retry; the second failure
//! surfaces as a typed error. The model translates — it never executes.

use crate::config::{LimitConfig, SignalBindings};
use crate::intent::client::IntentModel;
use crate::intent::{
    ConversationTurn, Filter, IntentError, IntentResult, PathConstraint, QueryIntent,
    RankingCriterion, Signal,
};
use crate::schema::GraphSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You translate questions about a movie graph into structured query \
intents. You only ever answer with a single JSON object, no markdown, no prose. You never invent \
node kinds, edge kinds, attributes, operators or signals that are not in the vocabulary given to \
you.";

/// Wire shape of the model's reply; limits are applied on conversion
#[derive(Debug, Deserialize)]
struct IntentDoc {
    #[serde(default)]
    target: String,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    paths: Vec<PathConstraint>,
    #[serde(default)]
    ranking: Vec<RankingCriterion>,
    limit: Option<usize>,
}

impl IntentDoc {
    fn into_intent(self, limits: &LimitConfig) -> QueryIntent {
        let limit = self
            .limit
            .unwrap_or(limits.default_limit)
            .min(limits.max_limit);
        QueryIntent {
            target: self.target,
            filters: self.filters,
            paths: self.paths,
            ranking: self.ranking,
            limit,
        }
    }
}

/// Translates natural-language requests into validated intents
pub struct IntentParser {
    model: Arc<dyn IntentModel>,
    schema: Arc<GraphSchema>,
    limits: LimitConfig,
    bindings: SignalBindings,
}

impl IntentParser {
    pub fn new(
        model: Arc<dyn IntentModel>,
        schema: Arc<GraphSchema>,
        limits: LimitConfig,
        bindings: SignalBindings,
    ) -> Self {
        Self {
            model,
            schema,
            limits,
            bindings,
        }
    }

    /// Parse one request, with prior turns for follow-up resolution.
    ///
    /// Exactly one corrective retry on an invalid reply; transport failures
    /// are not retried here (the model client owns its own timeout).
    pub async fn parse(
        &self,
        text: &str,
        history: &[ConversationTurn],
    ) -> IntentResult<QueryIntent> {
        let prompt = self.build_prompt(text, history, None);
        let reply = self.complete(&prompt).await?;

        match self.decode(&reply) {
            Ok(intent) => Ok(intent),
            Err(first_failure) => {
                warn!(error = %first_failure, "intent reply rejected, retrying once");
                let prompt = self.build_prompt(text, history, Some(&first_failure));
                let reply = self.complete(&prompt).await?;
                self.decode(&reply)
            }
        }
    }

    async fn complete(&self, prompt: &str) -> IntentResult<String> {
        self.model
            .complete(SYSTEM_PROMPT, prompt)
            .await
            .map_err(|e| IntentError::ModelUnavailable(e.to_string()))
    }

    /// Decode and validate one model reply. Validation against the closed
    /// vocabulary is the safety boundary: a reply referencing anything the
    /// schema does not declare is rejected here, never executed.
    fn decode(&self, reply: &str) -> IntentResult<QueryIntent> {
        let json = extract_json(reply);
        let doc: IntentDoc = serde_json::from_str(&json).map_err(|e| {
            IntentError::Ambiguous(format!("reply is not a valid intent document: {e}"))
        })?;
        let intent = doc.into_intent(&self.limits);
        intent.validate(&self.schema, &self.bindings)?;
        debug!(kind = %intent.target, paths = intent.paths.len(), "intent accepted");
        Ok(intent)
    }

    fn build_prompt(
        &self,
        text: &str,
        history: &[ConversationTurn],
        correction: Option<&IntentError>,
    ) -> String {
        let signals: Vec<&str> = Signal::all().iter().map(|s| s.name()).collect();
        let mut prompt = format!(
            "Vocabulary (nothing outside it is legal):\n{}\
Filter operators: eq, ne, lt, le, gt, ge, contains\n\
Ranking signals: {}\n\n\
Answer with one JSON object:\n\
{{\"target\": \"<node kind>\",\n \
\"filters\": [{{\"attribute\": \"...\", \"op\": \"eq\", \"value\": ..., \
\"anchor\": \"target\" | {{\"path_start\": 0}}}}],\n \
\"paths\": [{{\"steps\": [{{\"edge\": \"...\", \"direction\": \"forward\" | \"reverse\"}}], \
\"depth\": {{\"min\": 1, \"max\": 2}}}}],\n \
\"ranking\": [{{\"signal\": \"...\", \"weight\": 1.0, \"direction\": \"descending\"}}],\n \
\"limit\": 10}}\n\n\
Filters that describe the thing the question starts from (\"similar to X\", \"liked by Y\") \
anchor at the path start; filters that describe the results anchor at the target.\n",
            self.schema.vocabulary(),
            signals.join(", "),
        );

        if !history.is_empty() {
            prompt.push_str("\nPrior turns, most recent last:\n");
            for turn in history {
                let intent_json =
                    serde_json::to_string(&turn.intent).unwrap_or_else(|_| "{}".into());
                prompt.push_str(&format!("  intent: {}\n  answer: {}\n", intent_json, turn.summary));
            }
        }

        if let Some(error) = correction {
            prompt.push_str(&format!(
                "\nYour previous reply was rejected: {error}. \
Answer again using only the vocabulary above.\n"
            ));
        }

        prompt.push_str(&format!("\nQuestion: {text}\n"));
        prompt
    }
}

/// Pull the JSON object out of a reply that may carry markdown fences or
/// surrounding prose.
fn extract_json(reply: &str) -> String {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_fence[body_start..].find("```") {
            return after_fence[body_start..body_start + end].trim().to_string();
        }
    }

    // No fences: take the outermost object
    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            return trimmed[open..=close].to_string();
        }
    }

    trimmed.to_string()
}
