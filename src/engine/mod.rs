//! Batch execution: per-tenant leases, the worker pool and run reports.

pub mod lease;
pub mod orchestrator;
pub mod report;

pub use lease::{LeaseGuard, LeaseRegistry};
pub use orchestrator::Orchestrator;
pub use report::{
    DailyReport, DetectionSummary, StatsReport, TenantDaily, TenantFailure, TenantRunReport,
    TenantStats,
};
