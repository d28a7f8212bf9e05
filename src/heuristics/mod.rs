//! Rule-based detectors.
//!
//! Each heuristic is stateless: it reads one tenant's ledger through a
//! [`LedgerReader`], applies the tenant's [`DetectionConfig`] and returns
//! candidate [`Finding`]s. Turning findings into alerts is the job of the
//! [`AlertDeduplicator`](crate::alerts::AlertDeduplicator).

pub mod circular_transfer;
pub mod inactive_balance;
pub mod large_transfer;
pub mod velocity;

pub use circular_transfer::CircularTransferHeuristic;
pub use inactive_balance::InactiveHighBalanceHeuristic;
pub use large_transfer::LargeTransferHeuristic;
pub use velocity::VelocityHeuristic;

use crate::alerts::alert::{AlertType, DedupKey, Severity, TimeBucket};
use crate::alerts::evidence::Evidence;
use crate::core::config::DetectionConfig;
use crate::core::error::EngineError;
use crate::core::tenant::TenantScope;
use crate::core::transaction::Transaction;
use crate::core::user::UserId;
use crate::ledger::LedgerReader;
use chrono::{DateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// A pattern reported by one heuristic, before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub alert_type: AlertType,
    pub subjects: BTreeSet<UserId>,
    pub evidence: Evidence,
    /// Observed measure divided by its threshold; drives severity.
    pub ratio: Decimal,
    /// Timestamp the dedup time bucket is derived from: the newest evidence
    /// transaction, which is the last one to leave a sliding window.
    pub anchor: Option<DateTime<Utc>>,
}

impl Finding {
    pub fn severity(&self, config: &DetectionConfig) -> Severity {
        Severity::from_ratio(self.ratio, &config.severity_bands)
    }

    pub fn time_bucket(&self, config: &DetectionConfig) -> TimeBucket {
        TimeBucket::of(self.anchor, config.dedup_bucket())
    }

    pub fn dedup_key(&self, scope: &TenantScope, config: &DetectionConfig) -> DedupKey {
        DedupKey::compute(
            scope.tenant_id(),
            self.alert_type,
            &self.subjects,
            self.time_bucket(config),
        )
    }
}

/// What one heuristic produced for one tenant.
#[derive(Debug, Clone, Default)]
pub struct HeuristicOutcome {
    pub findings: Vec<Finding>,
    /// Ids of records that were skipped as malformed.
    pub skipped: Vec<String>,
    /// The tenant deadline fired; `findings` is partial.
    pub interrupted: bool,
}

/// A deterministic detection rule.
pub trait Heuristic: Send + Sync {
    fn alert_type(&self) -> AlertType;

    fn scan(
        &self,
        scope: &TenantScope,
        ledger: &dyn LedgerReader,
        config: &DetectionConfig,
    ) -> Result<HeuristicOutcome, EngineError>;
}

/// The four built-in heuristics in the order the orchestrator runs them.
pub fn default_heuristics() -> Vec<Box<dyn Heuristic>> {
    vec![
        Box::new(LargeTransferHeuristic),
        Box::new(VelocityHeuristic),
        Box::new(CircularTransferHeuristic),
        Box::new(InactiveHighBalanceHeuristic),
    ]
}

/// Read `[since, until]` and drop records that fail validation.
pub(crate) fn read_valid_window(
    scope: &TenantScope,
    ledger: &dyn LedgerReader,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    alert_type: AlertType,
    skipped: &mut Vec<String>,
) -> Result<Vec<Transaction>, EngineError> {
    let mut valid = Vec::new();
    for tx in ledger.query(scope.tenant_id(), since, until)? {
        match tx.validate(scope.tenant_id()) {
            Ok(()) => valid.push(tx),
            Err(e) => {
                warn!(
                    "tenant {}: {} skipped record {} ({})",
                    scope.tenant(),
                    alert_type,
                    tx.id(),
                    e
                );
                skipped.push(tx.id().to_string());
            }
        }
    }
    Ok(valid)
}
