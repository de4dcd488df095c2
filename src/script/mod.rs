/// Embedded script evaluation
///
/// CONDITION and CODE nodes run user-supplied script against the outputs of
/// previously executed nodes. Runners talk to the evaluator through the
/// `ExpressionEvaluator` trait so the concrete scripting backend stays
/// swappable; the shipped backend embeds Lua 5.4.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Lua 5.4 evaluator backend
pub mod lua;

// Re-export the shipped backend
pub use lua::LuaEvaluator;

/// Errors surfaced by script evaluation
///
/// Runners convert these into failed node results; they never cross the
/// engine boundary as errors.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Parse or runtime error from the scripting backend
    #[error("{0}")]
    Eval(String),

    /// The evaluation exceeded its wall-clock budget
    #[error("script exceeded its {0}ms budget")]
    BudgetExceeded(u64),

    /// The evaluation worker went away (panicked or was cancelled)
    #[error("script worker failed: {0}")]
    Worker(String),
}

/// Evaluation contract between node runners and the scripting backend
///
/// `bindings` become global variables visible to the script. `evaluate`
/// returns the script's final value converted to JSON; `evaluate_bool`
/// applies the backend's native truthiness to that same final value.
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync + std::fmt::Debug {
    async fn evaluate(
        &self,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError>;

    async fn evaluate_bool(
        &self,
        source: &str,
        bindings: Vec<(String, Value)>,
    ) -> Result<bool, ScriptError>;
}
