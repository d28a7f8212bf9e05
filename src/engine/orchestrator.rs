use crate::alerts::dedup::AlertDeduplicator;
use crate::alerts::store::AlertStore;
use crate::core::config::{ConfigResolver, EngineSettings};
use crate::core::error::EngineError;
use crate::core::tenant::{Tenant, TenantId, TenantScope};
use crate::engine::lease::LeaseRegistry;
use crate::engine::report::{
    DailyReport, DetectionSummary, StatsReport, TenantDaily, TenantFailure, TenantRunReport,
    TenantStats,
};
use crate::heuristics::{default_heuristics, Heuristic};
use crate::ledger::{LedgerReader, TenantRegistry};
use chrono::{DateTime, Duration, Utc};
use crossbeam::channel;
use log::{error, info, warn};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// How one tenant's detection pass ended.
#[derive(Debug)]
pub enum TenantRun {
    Completed(TenantRunReport),
    /// Another run holds the tenant's lease.
    LeaseHeld(TenantId),
}

/// Runs detection and reporting over every active tenant.
///
/// Tenants are handed to a fixed number of worker threads. Each tenant runs
/// inside its own [`TenantScope`] with a deadline; errors and panics are
/// captured per tenant and never stop the batch.
pub struct Orchestrator {
    ledger: Arc<dyn LedgerReader>,
    registry: Arc<dyn TenantRegistry>,
    store: Arc<dyn AlertStore>,
    resolver: Arc<ConfigResolver>,
    heuristics: Vec<Box<dyn Heuristic>>,
    dedup: AlertDeduplicator,
    leases: Arc<LeaseRegistry>,
    settings: EngineSettings,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        registry: Arc<dyn TenantRegistry>,
        store: Arc<dyn AlertStore>,
        resolver: Arc<ConfigResolver>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledger,
            registry,
            dedup: AlertDeduplicator::new(store.clone()),
            store,
            resolver,
            heuristics: default_heuristics(),
            leases: Arc::new(LeaseRegistry::new(settings.lease_ttl())),
            settings,
        }
    }

    pub fn with_heuristics(mut self, heuristics: Vec<Box<dyn Heuristic>>) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Share leases with other orchestrators working on the same store.
    pub fn with_leases(mut self, leases: Arc<LeaseRegistry>) -> Self {
        self.leases = leases;
        self
    }

    pub fn leases(&self) -> &Arc<LeaseRegistry> {
        &self.leases
    }

    /// Run every heuristic over every active tenant.
    ///
    /// Only a failure to list tenants is returned as an error; everything
    /// else ends up in the summary.
    pub fn detect(&self, now: DateTime<Utc>) -> Result<DetectionSummary, EngineError> {
        let tenants = self.registry.list_active_tenants()?;
        info!("detect: {} active tenants, {} workers", tenants.len(), self.settings.workers);

        let mut summary = DetectionSummary::new(now);
        let results = self.run_pool(tenants, |tenant| {
            self.detect_tenant(tenant, now)
                .map_err(|e| TenantFailure::from_error(tenant, &e))
        });
        for result in results {
            match result {
                Ok(TenantRun::Completed(report)) => summary.tenants.push(report),
                Ok(TenantRun::LeaseHeld(id)) => summary.lease_skipped.push(id),
                Err(failure) => summary.failures.push(failure),
            }
        }

        info!(
            "detect: {} alerts created, {} duplicates, {} failed tenants",
            summary.alerts_created(),
            summary.duplicates_suppressed(),
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Detection pass for a single tenant.
    pub fn detect_tenant(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<TenantRun, EngineError> {
        let Some(_lease) = self.leases.try_acquire(tenant.id) else {
            info!("tenant {}: lease held by another run, skipping", tenant);
            return Ok(TenantRun::LeaseHeld(tenant.id));
        };
        let scope = TenantScope::new(tenant.clone(), now)?.with_timeout(self.settings.tenant_timeout());
        let config = self.resolver.resolve(tenant.id);
        let mut report = TenantRunReport::new(tenant);
        let mut findings = Vec::new();

        for heuristic in &self.heuristics {
            if scope.is_expired() {
                report.timed_out = true;
                break;
            }
            let outcome = heuristic.scan(&scope, self.ledger.as_ref(), &config)?;
            report
                .findings
                .insert(heuristic.alert_type(), outcome.findings.len());
            report.skipped_records.extend(outcome.skipped);
            findings.extend(outcome.findings);
            if outcome.interrupted {
                report.timed_out = true;
                break;
            }
        }
        if report.timed_out {
            warn!(
                "tenant {}: deadline reached, submitting {} partial findings",
                tenant,
                findings.len()
            );
        }

        let outcome = self.dedup.process(&scope, findings, &config)?;
        report.alerts_created = outcome.created;
        report.duplicates_suppressed = outcome.duplicates;
        info!(
            "tenant {}: {} findings, {} new alerts, {} duplicates",
            tenant,
            report.total_findings(),
            outcome.created,
            outcome.duplicates
        );
        Ok(TenantRun::Completed(report))
    }

    /// Alert counts by status and type for every active tenant.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<StatsReport, EngineError> {
        let tenants = self.registry.list_active_tenants()?;
        let mut report = StatsReport {
            generated_at: now,
            tenants: Vec::new(),
            failures: Vec::new(),
        };
        let results = self.run_pool(tenants, |tenant| {
            let counts = TenantScope::new(tenant.clone(), now).and_then(|scope| {
                Ok(TenantStats {
                    tenant_id: scope.tenant_id(),
                    slug: tenant.slug.clone(),
                    by_status: self.store.counts_by_status(scope.tenant_id())?,
                    by_type: self.store.counts_by_type(scope.tenant_id())?,
                })
            });
            counts.map_err(|e| TenantFailure::from_error(tenant, &e))
        });
        for result in results {
            match result {
                Ok(stats) => report.tenants.push(stats),
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }

    /// Alerts created in the 24 hours before `now`, plus open counts.
    pub fn daily_report(&self, now: DateTime<Utc>) -> Result<DailyReport, EngineError> {
        let tenants = self.registry.list_active_tenants()?;
        let since = now - Duration::hours(24);
        let mut report = DailyReport {
            since,
            until: now,
            tenants: Vec::new(),
            failures: Vec::new(),
        };
        let results = self.run_pool(tenants, |tenant| {
            self.daily_for(tenant, since, now)
                .map_err(|e| TenantFailure::from_error(tenant, &e))
        });
        for result in results {
            match result {
                Ok(daily) => report.tenants.push(daily),
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }

    fn daily_for(
        &self,
        tenant: &Tenant,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TenantDaily, EngineError> {
        let scope = TenantScope::new(tenant.clone(), now)?;
        let mut daily = TenantDaily {
            tenant_id: scope.tenant_id(),
            slug: tenant.slug.clone(),
            created_by_type: BTreeMap::new(),
            created_by_severity: BTreeMap::new(),
            open: 0,
        };
        for alert in self.store.list(scope.tenant_id())? {
            scope.ensure_owns(alert.tenant_id())?;
            if alert.status().is_active() {
                daily.open += 1;
            }
            if alert.created_at() >= since && alert.created_at() <= now {
                *daily.created_by_type.entry(alert.alert_type()).or_insert(0) += 1;
                *daily.created_by_severity.entry(alert.severity()).or_insert(0) += 1;
            }
        }
        Ok(daily)
    }

    /// Run `work` for every tenant on at most `settings.workers` threads.
    ///
    /// Results come back in tenant order. A panic inside `work` becomes that
    /// tenant's failure.
    fn run_pool<T, F>(&self, tenants: Vec<Tenant>, work: F) -> Vec<Result<T, TenantFailure>>
    where
        T: Send,
        F: Fn(&Tenant) -> Result<T, TenantFailure> + Sync,
    {
        let total = tenants.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.settings.workers.clamp(1, total);
        let (job_tx, job_rx) = channel::unbounded::<(usize, Tenant)>();
        let (result_tx, result_rx) = channel::unbounded();
        for job in tenants.into_iter().enumerate() {
            // Both ends are alive here; an unbounded send cannot fail.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let work = &work;
        let pool = crossbeam::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move |_| {
                    for (index, tenant) in job_rx.iter() {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| work(&tenant)))
                            .unwrap_or_else(|payload| {
                                let message = panic_message(payload.as_ref());
                                error!("tenant {}: panicked: {}", tenant, message);
                                Err(TenantFailure::panicked(&tenant, message))
                            });
                        if let Err(failure) = &result {
                            if failure.kind != "panic" {
                                error!("tenant {}#{}: {}", failure.slug, failure.tenant_id, failure.message);
                            }
                        }
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);
        if pool.is_err() {
            error!("worker pool terminated abnormally");
        }

        let mut results: Vec<(usize, Result<T, TenantFailure>)> = result_rx.iter().collect();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, r)| r).collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
