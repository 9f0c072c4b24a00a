use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-readable error category, kept small and stable across the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OptimizerErrorKind {
    Validation,
    NotFound,
    Precondition,
    Platform,
    Persistence,
    Unknown,
}

/// Canonical error payload for input-shape and store-level failures.
///
/// Component results (`EngineResult`, `ExecutionRecord`, `VerificationResult`,
/// `MonitorRunResult`) do not use this type — they carry their own
/// `success`/`error` fields and are never wrapped in `Result`. This error is
/// reserved for failures that must fail fast before any mutation happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerError {
    pub kind: OptimizerErrorKind,
    pub message: String,
    pub context: Option<Value>,
}

impl OptimizerError {
    pub fn new(kind: OptimizerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(OptimizerErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OptimizerErrorKind::NotFound, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(OptimizerErrorKind::Precondition, message)
    }

    pub fn platform(message: impl Into<String>) -> Self {
        Self::new(OptimizerErrorKind::Platform, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(OptimizerErrorKind::Persistence, message)
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl std::fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for OptimizerError {}
