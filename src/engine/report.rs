use crate::alerts::alert::{AlertStatus, AlertType, Severity};
use crate::core::error::EngineError;
use crate::core::tenant::{Tenant, TenantId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Why one tenant produced no result in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantFailure {
    pub tenant_id: TenantId,
    pub slug: String,
    /// Short error class, see [`EngineError::kind`].
    pub kind: String,
    pub message: String,
    /// The failure is expected to clear by itself on the next scheduled run.
    pub retry_next_run: bool,
}

impl TenantFailure {
    pub fn from_error(tenant: &Tenant, err: &EngineError) -> Self {
        Self {
            tenant_id: tenant.id,
            slug: tenant.slug.clone(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            retry_next_run: err.is_transient(),
        }
    }

    pub fn panicked(tenant: &Tenant, message: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant.id,
            slug: tenant.slug.clone(),
            kind: "panic".to_string(),
            message: message.into(),
            retry_next_run: true,
        }
    }
}

impl fmt::Display for TenantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} [{}] {}",
            self.slug, self.tenant_id, self.kind, self.message
        )?;
        if self.retry_next_run {
            write!(f, " (retry next run)")?;
        }
        Ok(())
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[TenantFailure]) -> fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(f, "\nFailed Tenants:")?;
    for failure in failures {
        writeln!(f, "  {}", failure)?;
    }
    Ok(())
}

// --- detect ---

/// Outcome of one tenant's detection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantRunReport {
    pub tenant_id: TenantId,
    pub slug: String,
    pub findings: BTreeMap<AlertType, usize>,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
    pub skipped_records: Vec<String>,
    /// The tenant deadline fired; the partial findings were still submitted.
    pub timed_out: bool,
}

impl TenantRunReport {
    pub fn new(tenant: &Tenant) -> Self {
        Self {
            tenant_id: tenant.id,
            slug: tenant.slug.clone(),
            findings: BTreeMap::new(),
            alerts_created: 0,
            duplicates_suppressed: 0,
            skipped_records: Vec::new(),
            timed_out: false,
        }
    }

    pub fn total_findings(&self) -> usize {
        self.findings.values().sum()
    }
}

/// Result of one `detect` batch over every active tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub run_at: DateTime<Utc>,
    pub tenants: Vec<TenantRunReport>,
    /// Tenants whose advisory lease was held by another run.
    pub lease_skipped: Vec<TenantId>,
    pub failures: Vec<TenantFailure>,
}

impl DetectionSummary {
    pub fn new(run_at: DateTime<Utc>) -> Self {
        Self {
            run_at,
            tenants: Vec::new(),
            lease_skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn alerts_created(&self) -> usize {
        self.tenants.iter().map(|t| t.alerts_created).sum()
    }

    pub fn duplicates_suppressed(&self) -> usize {
        self.tenants.iter().map(|t| t.duplicates_suppressed).sum()
    }

    pub fn tenant(&self, id: TenantId) -> Option<&TenantRunReport> {
        self.tenants.iter().find(|t| t.tenant_id == id)
    }
}

impl fmt::Display for DetectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Detection Run {} ===", self.run_at.to_rfc3339())?;
        writeln!(f, "Tenants Scanned:  {}", self.tenants.len())?;
        writeln!(f, "Alerts Created:   {}", self.alerts_created())?;
        writeln!(f, "Duplicates:       {}", self.duplicates_suppressed())?;
        writeln!(f, "Lease Skipped:    {}", self.lease_skipped.len())?;
        writeln!(f, "Failed:           {}", self.failures.len())?;

        for tenant in &self.tenants {
            writeln!(f, "\n--- {}#{} ---", tenant.slug, tenant.tenant_id)?;
            for (alert_type, count) in &tenant.findings {
                writeln!(f, "  {:<22} {}", alert_type.as_str(), count)?;
            }
            writeln!(f, "  created:   {}", tenant.alerts_created)?;
            writeln!(f, "  duplicate: {}", tenant.duplicates_suppressed)?;
            if !tenant.skipped_records.is_empty() {
                writeln!(f, "  skipped:   {}", tenant.skipped_records.join(", "))?;
            }
            if tenant.timed_out {
                writeln!(f, "  TIMED OUT (partial findings submitted)")?;
            }
        }
        write_failures(f, &self.failures)
    }
}

// --- stats ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantStats {
    pub tenant_id: TenantId,
    pub slug: String,
    pub by_status: BTreeMap<AlertStatus, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
}

/// Alert counts per tenant. Tenants that could not be read are listed
/// under `failures` instead of aborting the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub generated_at: DateTime<Utc>,
    pub tenants: Vec<TenantStats>,
    pub failures: Vec<TenantFailure>,
}

impl StatsReport {
    pub fn total_by_status(&self) -> BTreeMap<AlertStatus, usize> {
        let mut total = BTreeMap::new();
        for tenant in &self.tenants {
            for (status, count) in &tenant.by_status {
                *total.entry(*status).or_insert(0) += count;
            }
        }
        total
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Alert Statistics {} ===", self.generated_at.to_rfc3339())?;
        for (status, count) in self.total_by_status() {
            writeln!(f, "{:<12} {}", status.as_str(), count)?;
        }
        for tenant in &self.tenants {
            writeln!(f, "\n--- {}#{} ---", tenant.slug, tenant.tenant_id)?;
            for status in AlertStatus::ALL {
                let count = tenant.by_status.get(&status).copied().unwrap_or(0);
                writeln!(f, "  {:<22} {}", status.as_str(), count)?;
            }
            for alert_type in AlertType::ALL {
                let count = tenant.by_type.get(&alert_type).copied().unwrap_or(0);
                writeln!(f, "  {:<22} {}", alert_type.as_str(), count)?;
            }
        }
        write_failures(f, &self.failures)
    }
}

// --- daily report ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantDaily {
    pub tenant_id: TenantId,
    pub slug: String,
    pub created_by_type: BTreeMap<AlertType, usize>,
    pub created_by_severity: BTreeMap<Severity, usize>,
    /// Alerts still `new` or `reviewing`, regardless of age.
    pub open: usize,
}

impl TenantDaily {
    pub fn created(&self) -> usize {
        self.created_by_type.values().sum()
    }
}

/// Alerts raised in the trailing 24 hours, per tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub tenants: Vec<TenantDaily>,
    pub failures: Vec<TenantFailure>,
}

impl fmt::Display for DailyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Daily Abuse Report ===")?;
        writeln!(f, "Window: {} .. {}", self.since.to_rfc3339(), self.until.to_rfc3339())?;
        let created: usize = self.tenants.iter().map(|t| t.created()).sum();
        let open: usize = self.tenants.iter().map(|t| t.open).sum();
        writeln!(f, "New Alerts:  {}", created)?;
        writeln!(f, "Open Alerts: {}", open)?;

        for tenant in self.tenants.iter().filter(|t| t.created() > 0 || t.open > 0) {
            writeln!(f, "\n--- {}#{} ---", tenant.slug, tenant.tenant_id)?;
            for (alert_type, count) in &tenant.created_by_type {
                writeln!(f, "  {:<22} {}", alert_type.as_str(), count)?;
            }
            for (severity, count) in tenant.created_by_severity.iter().rev() {
                writeln!(f, "  {:<22} {}", severity.as_str(), count)?;
            }
            writeln!(f, "  open: {}", tenant.open)?;
        }
        write_failures(f, &self.failures)
    }
}
