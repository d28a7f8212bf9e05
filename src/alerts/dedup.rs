use crate::alerts::alert::Alert;
use crate::alerts::store::AlertStore;
use crate::core::config::DetectionConfig;
use crate::core::error::EngineError;
use crate::core::tenant::TenantScope;
use crate::core::transaction::TransactionId;
use crate::heuristics::Finding;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

/// Counts from one [`AlertDeduplicator::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    pub created: usize,
    pub duplicates: usize,
}

impl DedupOutcome {
    pub fn merge(&mut self, other: DedupOutcome) {
        self.created += other.created;
        self.duplicates += other.duplicates;
    }
}

/// Turns heuristic findings into alerts, at most one active alert per
/// dedup key.
#[derive(Clone)]
pub struct AlertDeduplicator {
    store: Arc<dyn AlertStore>,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Persist every finding that has no active alert yet.
    ///
    /// A finding is a duplicate when an active alert holds its dedup key, or
    /// when an active alert of the same type and subjects already references
    /// every transaction in its evidence. The second rule keeps a shrinking
    /// window from re-raising a pattern under a different bucket.
    ///
    /// A store error aborts the batch; alerts inserted before the error stay
    /// in place and are recognised as duplicates on the next run.
    pub fn process(
        &self,
        scope: &TenantScope,
        findings: Vec<Finding>,
        config: &DetectionConfig,
    ) -> Result<DedupOutcome, EngineError> {
        let mut outcome = DedupOutcome::default();
        let mut active: Option<Vec<Alert>> = None;
        for finding in findings {
            let key = finding.dedup_key(scope, config);
            if let Some(existing) = self.store.find_active(scope.tenant_id(), &key)? {
                debug!(
                    "tenant {}: {} covered by active alert {}",
                    scope.tenant(),
                    finding.alert_type,
                    existing.id()
                );
                outcome.duplicates += 1;
                continue;
            }

            let referenced = finding.evidence.transaction_ids();
            if !referenced.is_empty() {
                if active.is_none() {
                    active = Some(self.active_alerts(scope)?);
                }
                if let Some(existing) = active
                    .iter()
                    .flatten()
                    .find(|alert| covers(alert, &finding, &referenced))
                {
                    debug!(
                        "tenant {}: {} evidence already held by active alert {}",
                        scope.tenant(),
                        finding.alert_type,
                        existing.id()
                    );
                    outcome.duplicates += 1;
                    continue;
                }
            }

            let severity = finding.severity(config);
            let alert = Alert::new(
                scope.tenant_id(),
                finding.alert_type,
                severity,
                finding.subjects,
                finding.evidence,
                key,
                scope.now(),
            );
            let id = alert.id();
            let alert_type = alert.alert_type();
            if let Some(alerts) = active.as_mut() {
                alerts.push(alert.clone());
            }
            if self.store.insert_if_absent(alert)? {
                info!(
                    "tenant {}: raised {} alert {} ({})",
                    scope.tenant(),
                    alert_type,
                    id,
                    severity
                );
                outcome.created += 1;
            } else {
                // Lost a race against a concurrent insert of the same key.
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }

    fn active_alerts(&self, scope: &TenantScope) -> Result<Vec<Alert>, EngineError> {
        let mut alerts = self.store.list(scope.tenant_id())?;
        alerts.retain(|alert| alert.status().is_active());
        Ok(alerts)
    }
}

fn covers(alert: &Alert, finding: &Finding, referenced: &[TransactionId]) -> bool {
    alert.alert_type() == finding.alert_type
        && alert.subject_user_ids() == &finding.subjects
        && referenced.iter().all(|id| alert.evidence().references(*id))
}
