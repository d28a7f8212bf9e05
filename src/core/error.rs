use crate::core::tenant::TenantId;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the detection engine and its collaborators.
///
/// No variant ever crosses a tenant boundary: the orchestrator and the
/// lifecycle pass catch every error per tenant, log it and move on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ledger or alert store could not be reached; retried on the next run.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// The tenant scope is missing, inactive or does not match the data.
    #[error("invalid tenant scope for tenant {tenant}: {reason}")]
    TenantIsolation { tenant: TenantId, reason: String },

    /// A single ledger record could not be evaluated.
    #[error("malformed record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("invalid alert status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// True when retrying on the next scheduled run may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientStore(_))
    }

    /// Short machine-readable label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::TransientStore(_) => "transient_store",
            EngineError::TenantIsolation { .. } => "tenant_isolation",
            EngineError::MalformedRecord { .. } => "heuristic_compute",
            EngineError::AlertNotFound(_) => "alert_not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Config(_) => "config",
            EngineError::Serialization(_) => "serialization",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::TransientStore(err.to_string())
    }
}
