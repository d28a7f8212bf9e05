use crate::alerts::alert::{Alert, AlertStatus, Severity};
use crate::alerts::store::AlertStore;
use crate::core::config::{ConfigResolver, DetectionConfig};
use crate::core::error::EngineError;
use crate::core::tenant::{TenantId, TenantScope};
use crate::engine::report::TenantFailure;
use crate::ledger::TenantRegistry;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantCleanup {
    pub tenant_id: TenantId,
    pub slug: String,
    pub auto_dismissed: usize,
    pub archived: usize,
}

/// Result of one cleanup pass over every active tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupSummary {
    pub ran_at: DateTime<Utc>,
    pub tenants: Vec<TenantCleanup>,
    pub failures: Vec<TenantFailure>,
}

impl CleanupSummary {
    pub fn auto_dismissed(&self) -> usize {
        self.tenants.iter().map(|t| t.auto_dismissed).sum()
    }

    pub fn archived(&self) -> usize {
        self.tenants.iter().map(|t| t.archived).sum()
    }
}

impl fmt::Display for CleanupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Alert Cleanup {} ===", self.ran_at.to_rfc3339())?;
        writeln!(f, "Auto-dismissed: {}", self.auto_dismissed())?;
        writeln!(f, "Archived:       {}", self.archived())?;
        for tenant in &self.tenants {
            writeln!(
                f,
                "  {}#{}: dismissed {}, archived {}",
                tenant.slug, tenant.tenant_id, tenant.auto_dismissed, tenant.archived
            )?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "\nFailed Tenants:")?;
            for failure in &self.failures {
                writeln!(f, "  {}", failure)?;
            }
        }
        Ok(())
    }
}

/// Time-driven aging and reviewer-driven transitions of alerts.
///
/// Runs independently of detection. Every operation takes a
/// [`TenantScope`]; its `now` is the clock used for ages and timestamps.
pub struct LifecycleManager {
    store: Arc<dyn AlertStore>,
    resolver: Arc<ConfigResolver>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn AlertStore>, resolver: Arc<ConfigResolver>) -> Self {
        Self { store, resolver }
    }

    /// Auto-dismiss then archive for every active tenant.
    ///
    /// Fails only if the tenant list cannot be read.
    pub fn run(
        &self,
        registry: &dyn TenantRegistry,
        now: DateTime<Utc>,
    ) -> Result<CleanupSummary, EngineError> {
        let mut summary = CleanupSummary {
            ran_at: now,
            tenants: Vec::new(),
            failures: Vec::new(),
        };
        for tenant in registry.list_active_tenants()? {
            let result = TenantScope::new(tenant.clone(), now).and_then(|scope| {
                let config = self.resolver.resolve(scope.tenant_id());
                let auto_dismissed = self.auto_dismiss(&scope, &config)?;
                let archived = self.archive(&scope, &config)?;
                Ok(TenantCleanup {
                    tenant_id: scope.tenant_id(),
                    slug: tenant.slug.clone(),
                    auto_dismissed,
                    archived,
                })
            });
            match result {
                Ok(cleanup) => {
                    info!(
                        "tenant {}: auto-dismissed {}, archived {}",
                        tenant, cleanup.auto_dismissed, cleanup.archived
                    );
                    summary.tenants.push(cleanup);
                }
                Err(e) => {
                    error!("tenant {}: cleanup failed: {}", tenant, e);
                    summary.failures.push(TenantFailure::from_error(&tenant, &e));
                }
            }
        }
        Ok(summary)
    }

    /// Dismiss `new` low-severity alerts older than `auto_dismiss_days`.
    pub fn auto_dismiss(&self, scope: &TenantScope, config: &DetectionConfig) -> Result<usize, EngineError> {
        let cutoff = scope.now() - config.auto_dismiss_age();
        let stale: Vec<Alert> = self
            .store
            .list(scope.tenant_id())?
            .into_iter()
            .filter(|a| {
                a.status() == AlertStatus::New
                    && a.severity() == Severity::Low
                    && a.created_at() < cutoff
            })
            .collect();

        let notes = format!(
            "auto-dismissed: low severity alert left unreviewed for more than {} days",
            config.auto_dismiss_days
        );
        let mut dismissed = 0;
        for alert in stale {
            scope.ensure_owns(alert.tenant_id())?;
            match self.store.update_status(
                scope.tenant_id(),
                alert.id(),
                AlertStatus::Dismissed,
                Some(notes.clone()),
                scope.now(),
            ) {
                Ok(_) => dismissed += 1,
                // A reviewer picked it up between the listing and the update.
                Err(EngineError::InvalidTransition { .. }) | Err(EngineError::AlertNotFound(_)) => {
                    debug!("tenant {}: alert {} changed during cleanup", scope.tenant(), alert.id());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dismissed)
    }

    /// Delete resolved and dismissed alerts closed before the retention window.
    pub fn archive(&self, scope: &TenantScope, config: &DetectionConfig) -> Result<usize, EngineError> {
        let cutoff = scope.now() - config.archive_retention();
        self.store.archive(
            scope.tenant_id(),
            &[AlertStatus::Resolved, AlertStatus::Dismissed],
            cutoff,
        )
    }

    pub fn begin_review(&self, scope: &TenantScope, id: Uuid) -> Result<Alert, EngineError> {
        self.transition(scope, id, AlertStatus::Reviewing, None)
    }

    pub fn resolve(&self, scope: &TenantScope, id: Uuid, notes: impl Into<String>) -> Result<Alert, EngineError> {
        self.transition(scope, id, AlertStatus::Resolved, Some(notes.into()))
    }

    pub fn dismiss(&self, scope: &TenantScope, id: Uuid, notes: Option<String>) -> Result<Alert, EngineError> {
        self.transition(scope, id, AlertStatus::Dismissed, notes)
    }

    fn transition(
        &self,
        scope: &TenantScope,
        id: Uuid,
        status: AlertStatus,
        notes: Option<String>,
    ) -> Result<Alert, EngineError> {
        let alert = self
            .store
            .update_status(scope.tenant_id(), id, status, notes, scope.now())?;
        info!("tenant {}: alert {} is now {}", scope.tenant(), id, status);
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::alert::{AlertType, DedupKey, TimeBucket};
    use crate::alerts::evidence::Evidence;
    use crate::alerts::store::MemoryAlertStore;
    use crate::core::tenant::Tenant;
    use crate::core::user::UserId;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn alert(user: &str, severity: Severity, created_days_ago: i64) -> Alert {
        let subjects = BTreeSet::from([UserId::new(user)]);
        let key = DedupKey::compute(
            TenantId::new(1),
            AlertType::InactiveHighBalance,
            &subjects,
            TimeBucket::Slot(created_days_ago),
        );
        Alert::new(
            TenantId::new(1),
            AlertType::InactiveHighBalance,
            severity,
            subjects,
            Evidence::InactiveHighBalance {
                balance: dec!(15),
                threshold: dec!(10),
                last_activity_at: None,
                inactivity_days: 90,
            },
            key,
            now() - Duration::days(created_days_ago),
        )
    }

    fn manager(store: Arc<MemoryAlertStore>) -> LifecycleManager {
        LifecycleManager::new(store, Arc::new(ConfigResolver::default()))
    }

    fn scope_at(at: DateTime<Utc>) -> TenantScope {
        TenantScope::new(Tenant::new(1, "riverside"), at).unwrap()
    }

    #[test]
    fn test_auto_dismiss_only_old_low_new_alerts() {
        let store = Arc::new(MemoryAlertStore::new());
        let old_low = alert("a", Severity::Low, 31);
        let young_low = alert("b", Severity::Low, 29);
        let old_high = alert("c", Severity::High, 40);
        for a in [&old_low, &young_low, &old_high] {
            store.insert_if_absent(a.clone()).unwrap();
        }

        let dismissed = manager(store.clone())
            .auto_dismiss(&scope_at(now()), &DetectionConfig::default())
            .unwrap();
        assert_eq!(dismissed, 1);

        let updated = store.get(TenantId::new(1), old_low.id()).unwrap().unwrap();
        assert_eq!(updated.status(), AlertStatus::Dismissed);
        assert!(updated.resolution_notes().is_some_and(|n| !n.is_empty()));
        assert_eq!(updated.resolved_at(), Some(now()));
        let untouched = store.get(TenantId::new(1), young_low.id()).unwrap().unwrap();
        assert_eq!(untouched.status(), AlertStatus::New);
    }

    #[test]
    fn test_archive_respects_retention() {
        let store = Arc::new(MemoryAlertStore::new());
        let manager = manager(store.clone());
        let old = alert("a", Severity::High, 200);
        let recent = alert("b", Severity::High, 200);
        let open = alert("c", Severity::High, 200);
        for a in [&old, &recent, &open] {
            store.insert_if_absent(a.clone()).unwrap();
        }
        manager
            .dismiss(&scope_at(now() - Duration::days(91)), old.id(), None)
            .unwrap();
        let reviewed_at = scope_at(now() - Duration::days(89));
        manager.begin_review(&reviewed_at, recent.id()).unwrap();
        manager.resolve(&reviewed_at, recent.id(), "refunded").unwrap();

        let archived = manager
            .archive(&scope_at(now()), &DetectionConfig::default())
            .unwrap();
        assert_eq!(archived, 1);
        assert!(store.get(TenantId::new(1), old.id()).unwrap().is_none());
        assert!(store.get(TenantId::new(1), recent.id()).unwrap().is_some());
        assert!(store.get(TenantId::new(1), open.id()).unwrap().is_some());
    }

    #[test]
    fn test_reviewer_flow() {
        let store = Arc::new(MemoryAlertStore::new());
        let manager = manager(store.clone());
        let a = alert("a", Severity::Medium, 1);
        store.insert_if_absent(a.clone()).unwrap();
        let scope = scope_at(now());

        let reviewing = manager.begin_review(&scope, a.id()).unwrap();
        assert_eq!(reviewing.status(), AlertStatus::Reviewing);
        assert_eq!(reviewing.resolved_at(), None);

        let resolved = manager.resolve(&scope, a.id(), "confirmed wash trading").unwrap();
        assert_eq!(resolved.status(), AlertStatus::Resolved);
        assert_eq!(resolved.resolution_notes(), Some("confirmed wash trading"));

        let err = manager.begin_review(&scope, a.id()).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn test_other_tenant_cannot_touch_alert() {
        let store = Arc::new(MemoryAlertStore::new());
        let manager = manager(store.clone());
        let a = alert("a", Severity::Medium, 1);
        store.insert_if_absent(a.clone()).unwrap();

        let other = TenantScope::new(Tenant::new(2, "hilltop"), now()).unwrap();
        let err = manager.dismiss(&other, a.id(), None).unwrap_err();
        assert_eq!(err.kind(), "alert_not_found");
    }
}
