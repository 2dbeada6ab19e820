//! Engine error taxonomy
//!
//! Every stage fails fast with a typed error; nothing substitutes a
//! default result. The caller receives either a complete payload or one
//! of these variants, mapped to its own transport representation.

use crate::exec::ExecError;
use crate::intent::IntentError;
use crate::plan::PlanError;
use crate::rank::RankError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The request's required slots could not be resolved
    #[error("ambiguous intent: {0}")]
    AmbiguousIntent(String),

    /// The request asks for something the schema cannot express
    #[error("unsupported intent: {0}")]
    UnsupportedIntent(String),

    /// The language model could not be reached
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    /// Filters and path constraints contradict each other or the schema
    #[error("unsatisfiable constraint: {0}")]
    UnsatisfiableConstraint(String),

    /// The plan's estimated cost or depth exceeds the configured bounds
    #[error("plan too expensive: {0}")]
    PlanTooExpensive(String),

    /// The store did not answer within its deadline or pool wait timeout
    #[error("execution timeout")]
    ExecutionTimeout,

    /// A fault reported by the store
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// No signal produced any score
    #[error("ranking unavailable")]
    RankingUnavailable,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<IntentError> for EngineError {
    fn from(error: IntentError) -> Self {
        match error {
            IntentError::Ambiguous(message) => EngineError::AmbiguousIntent(message),
            IntentError::Unsupported(message) => EngineError::UnsupportedIntent(message),
            IntentError::ModelUnavailable(message) => EngineError::ModelUnavailable(message),
        }
    }
}

impl From<PlanError> for EngineError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::TooExpensive(message) => EngineError::PlanTooExpensive(message),
            PlanError::Unsatisfiable(message) => EngineError::UnsatisfiableConstraint(message),
        }
    }
}

impl From<ExecError> for EngineError {
    fn from(error: ExecError) -> Self {
        match error {
            ExecError::Timeout => EngineError::ExecutionTimeout,
            ExecError::Store(message) => EngineError::ExecutionError(message),
        }
    }
}

impl From<RankError> for EngineError {
    fn from(error: RankError) -> Self {
        match error {
            RankError::Unavailable => EngineError::RankingUnavailable,
        }
    }
}
