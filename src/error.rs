//! Error types for the orchestration core.
//!
//! Stage-execution failures are not represented here: they are recorded as
//! condition state and a `Failed` phase, never bubbled up as process errors.
//! This enum covers the synchronous precondition/lookup failures returned to
//! callers before any background work is launched.

use thiserror::Error;

use crate::automation::AutomationError;
use crate::store::StoreError;

/// Error type for orchestrator operations
#[derive(Error, Debug)]
pub enum Error {
    /// Storage port failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A referenced record does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// A node of this cluster is already mid-operation
    #[error("NODE_ALREADY_RUNNING_TASK")]
    NodeTaskInProgress,

    /// Another workflow currently holds the cluster's advisory lock
    #[error("operation already in progress for cluster {cluster}: {holder}")]
    OperationInProgress { cluster: String, holder: String },

    /// Upgrade requested on an imported cluster
    #[error("CLUSTER_IS_NOT_LOCAL")]
    ClusterNotLocal,

    /// Cluster is not in a phase that permits the requested operation
    #[error("cluster {cluster} is in phase {phase}")]
    InvalidPhase { cluster: String, phase: String },

    /// Request validation failure (bad operation, empty target set, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Automation driver failure surfaced synchronously (log sink setup etc.)
    #[error("automation error: {0}")]
    Automation(#[from] AutomationError),

    /// Cloud provider query failed during host synthesis
    #[error("provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    /// Serialization of a stored variable bag failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;
