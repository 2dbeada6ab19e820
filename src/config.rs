//! Engine configuration
//!
//! Traversal depth, cost ceilings and result limits are enforced as
//! explicit invariants here rather than left to the underlying store's
//! defaults — unbounded traversal is the principal risk of letting natural
//! language drive graph queries. The ranking weight profile is versioned
//! so the structural/collaborative balance is an auditable policy choice,
//! not a hard-coded constant.

use crate::intent::client::LlmProvider;
use crate::intent::{RankingCriterion, Signal};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Plan builder bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Hard cap on traversal depth; a depth range reaching past this is
    /// rejected before execution
    pub max_depth: u32,
    /// Ceiling on the estimated node count a plan may touch
    pub cost_ceiling: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            cost_ceiling: 1_000_000,
        }
    }
}

/// Result limit bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Applied when a request names no limit
    pub default_limit: usize,
    /// Hard maximum; larger requested limits are clamped
    pub max_limit: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

/// Graph store executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Concurrent store queries allowed; callers queue beyond this
    pub pool_size: usize,
    /// How long a caller may wait for a pool slot before failing
    pub acquire_timeout_ms: u64,
    /// Deadline for one store round trip
    pub query_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            acquire_timeout_ms: 2_000,
            query_timeout_ms: 10_000,
        }
    }
}

/// Schema names the ranking signals are computed from.
///
/// Signals like "average rating" only make sense when the schema declares
/// a rating edge; these bindings say which declarations play those roles.
/// A signal whose binding is absent from the schema has no mapping and is
/// rejected at intent validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBindings {
    /// Edge kind carrying user ratings
    pub rating_edge: Option<String>,
    /// Float attribute on the rating edge
    pub rating_attribute: Option<String>,
    /// Edge kind linking results to their categories
    pub category_edge: Option<String>,
    /// Float edge attribute read as path weight
    pub weight_attribute: Option<String>,
    /// Node attribute read as popularity
    pub popularity_attribute: Option<String>,
}

impl Default for SignalBindings {
    fn default() -> Self {
        Self {
            rating_edge: Some("RATED".into()),
            rating_attribute: Some("rating".into()),
            category_edge: Some("BELONGS_TO".into()),
            weight_attribute: Some("similarity".into()),
            popularity_attribute: Some("popularity".into()),
        }
    }
}

/// Versioned default ranking weights
///
/// Used when a request names no ranking criteria. Collaborative evidence
/// (co-rating) outweighs structural fallbacks (genre overlap, popularity),
/// matching how the recommendation behavior was tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingProfile {
    pub version: u32,
    /// Items scoring below this are dropped before truncation
    pub min_score: f64,
    pub defaults: Vec<RankingCriterion>,
    pub bindings: SignalBindings,
}

impl Default for RankingProfile {
    fn default() -> Self {
        Self {
            version: 1,
            min_score: 0.0,
            defaults: vec![
                RankingCriterion::new(Signal::SharedNeighbors, 1.0),
                RankingCriterion::new(Signal::RatingOverlap, 0.75),
                RankingCriterion::new(Signal::AverageRating, 0.5),
                RankingCriterion::new(Signal::EdgeWeight, 0.5),
                RankingCriterion::new(Signal::GenreOverlap, 0.4),
                RankingCriterion::new(Signal::Popularity, 0.25),
                RankingCriterion::new(Signal::PathLength, 0.25),
            ],
            bindings: SignalBindings::default(),
        }
    }
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    /// Deadline for one model round trip
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: "claude-3-5-sonnet-20241022".into(),
            api_key: None,
            api_base_url: None,
            timeout_ms: 30_000,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub planner: PlannerConfig,
    pub limits: LimitConfig,
    pub executor: ExecutorConfig,
    pub ranking: RankingProfile,
    pub model: ModelConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file, applying defaults for omitted
    /// sections, then validate.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.planner.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        if self.planner.cost_ceiling == 0 {
            return Err(ConfigError::Invalid("cost_ceiling must be positive".into()));
        }
        if self.limits.default_limit > self.limits.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default_limit {} exceeds max_limit {}",
                self.limits.default_limit, self.limits.max_limit
            )));
        }
        if self.executor.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if !self.ranking.min_score.is_finite() {
            return Err(ConfigError::Invalid("min_score must be finite".into()));
        }
        for criterion in &self.ranking.defaults {
            if !criterion.weight.is_finite() || criterion.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight for {} must be a non-negative finite number",
                    criterion.signal
                )));
            }
        }
        Ok(())
    }
}
