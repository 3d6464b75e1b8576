mod dispatch;
mod normalize;
mod pool;

pub use dispatch::{Dispatcher, ExecutionBackend, HttpBackend, HttpDispatcher};
pub use normalize::normalize;
pub use pool::ProviderPool;

use serde::{Deserialize, Serialize};

use crate::config::Language;

/// One request against a remote execution backend. Built once per test case
/// per attempt and never mutated.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: Language,
    pub stdin: String,
    /// Provider-side comparison hint; grading does its own comparison.
    pub expected_output: Option<String>,
}

/// Canonical execution status, independent of any provider's native codes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Accepted,
    WrongAnswer,
    RuntimeError,
    CompileError,
    TimeLimitExceeded,
    ServiceError,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Accepted => "Accepted",
            ExecutionStatus::WrongAnswer => "Wrong Answer",
            ExecutionStatus::RuntimeError => "Runtime Error",
            ExecutionStatus::CompileError => "Compile Error",
            ExecutionStatus::TimeLimitExceeded => "Time Limit Exceeded",
            ExecutionStatus::ServiceError => "Service Error",
        }
    }
}

/// Canonical result every provider adapter must produce. String fields are
/// never null (empty string substituted), numeric fields default to 0, and
/// `status` is always set even when the native status is unparseable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    pub wall_time_ms: u64,
    pub memory_kb: u64,
}

impl ExecutionResult {
    /// Synthetic result for total provider unavailability.
    pub fn service_unavailable(detail: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Code execution service unavailable: {detail}"),
            status: ExecutionStatus::ServiceError,
            wall_time_ms: 0,
            memory_kb: 0,
        }
    }
}

/// Raw response as returned by a provider, before normalization. The variant
/// is decided by the provider's configured family, not by sniffing fields.
#[derive(Debug, Clone)]
pub enum RawProviderResponse {
    Judge(JudgeResponse),
    Script(ScriptResponse),
}

impl RawProviderResponse {
    /// A structurally valid response carries at least one of stdout, stderr
    /// or a native status; anything emptier is treated as a failed attempt.
    pub fn is_structurally_valid(&self) -> bool {
        match self {
            RawProviderResponse::Judge(j) => {
                j.stdout.is_some() || j.stderr.is_some() || j.compile_output.is_some() || j.status.is_some()
            }
            RawProviderResponse::Script(s) => s.run.is_some() || s.compile.is_some(),
        }
    }
}

/// Response shape of judge-family providers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JudgeResponse {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub status: Option<JudgeStatus>,
    /// Wall time in seconds, as a decimal string such as "0.002".
    pub time: Option<String>,
    /// Memory in KB.
    pub memory: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeStatus {
    pub id: u32,
    pub description: Option<String>,
}

/// Response shape of script-family providers: separate compile and run
/// stages, each a plain process outcome.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptResponse {
    pub compile: Option<ScriptStage>,
    pub run: Option<ScriptStage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptStage {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub code: Option<i64>,
    pub signal: Option<String>,
}
