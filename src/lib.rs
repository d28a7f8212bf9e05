//! # credit-watch
//!
//! Batch abuse detection for multi-tenant time-credit ledgers.
//!
//! Every active tenant's committed transaction history is scanned by a set
//! of deterministic heuristics. Their findings are turned into reviewable
//! alerts, at most one active alert per pattern, and aged out by a separate
//! lifecycle pass.
//!
//! ## Architecture
//!
//! - **core** — Foundational types: tenants and scopes, users, transactions, configuration, errors
//! - **ledger** — Read interface over committed transactions and the tenant registry
//! - **graph** — Transfer graph arena, strongly connected components, temporal cycle search
//! - **heuristics** — Large transfer, velocity, circular transfer and dormant balance detectors
//! - **alerts** — Alert model, stores, deduplication and lifecycle
//! - **engine** — Worker pool orchestration, advisory leases and run reports
//! - **simulation** — Synthetic ledgers for demos and benchmarks

pub mod alerts;
pub mod core;
pub mod engine;
pub mod graph;
pub mod heuristics;
pub mod ledger;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::alerts::{
        Alert, AlertStatus, AlertStore, AlertType, JsonFileAlertStore, LifecycleManager,
        MemoryAlertStore, Severity,
    };
    pub use crate::core::config::{ConfigFile, ConfigResolver, DetectionConfig, EngineSettings};
    pub use crate::core::error::EngineError;
    pub use crate::core::tenant::{Tenant, TenantId, TenantScope};
    pub use crate::core::transaction::Transaction;
    pub use crate::core::user::UserId;
    pub use crate::engine::Orchestrator;
    pub use crate::ledger::{LedgerReader, LedgerSnapshot, TenantRegistry};
}
