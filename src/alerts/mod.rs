//! Alert model, persistence, deduplication and lifecycle.

pub mod alert;
pub mod dedup;
pub mod evidence;
pub mod lifecycle;
pub mod store;

pub use alert::{Alert, AlertStatus, AlertType, DedupKey, Severity, TimeBucket};
pub use dedup::{AlertDeduplicator, DedupOutcome};
pub use evidence::{Evidence, EvidenceTransaction};
pub use lifecycle::{CleanupSummary, LifecycleManager, TenantCleanup};
pub use store::{AlertStore, JsonFileAlertStore, MemoryAlertStore};
