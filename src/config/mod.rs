/// Configuration management for the execution engine
///
/// Handles HTTP client and script evaluator tuning. Defaults read environment
/// variables so containerized deployments can adjust them without code changes.

use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Outbound HTTP client configuration
    pub http: HttpConfig,
    /// Embedded script evaluator configuration
    pub script: ScriptConfig,
}

/// Outbound HTTP client configuration
///
/// The per-request timeout comes from each node's `timeoutMs` config; this
/// only tunes the shared client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Embedded script evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Wall-clock budget per evaluation in milliseconds; scripts that exceed
    /// it fail their node instead of stalling the run
    pub budget_ms: u64,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            http: HttpConfig {
                connect_timeout_ms: std::env::var("DAGRUN_HTTP_CONNECT_TIMEOUT_MS")
                    .unwrap_or_else(|_| "10000".to_string())
                    .parse()
                    .unwrap_or(10_000),
            },
            script: ScriptConfig {
                budget_ms: std::env::var("DAGRUN_SCRIPT_BUDGET_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .unwrap_or(5_000),
            },
        }
    }
}
