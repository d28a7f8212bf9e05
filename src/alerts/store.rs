use crate::alerts::alert::{Alert, AlertStatus, AlertType, DedupKey};
use crate::core::error::EngineError;
use crate::core::tenant::TenantId;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Persistence for alerts. The engine's only owned state.
///
/// Every call is tenant-scoped: an alert id from another tenant behaves as
/// if it did not exist.
pub trait AlertStore: Send + Sync {
    /// Insert unless an active alert (new/reviewing) of the same tenant
    /// already holds `alert.dedup_key()`. Returns whether it was inserted.
    ///
    /// Atomic with respect to concurrent callers: of two racing inserts with
    /// the same key exactly one returns `true`.
    fn insert_if_absent(&self, alert: Alert) -> Result<bool, EngineError>;

    fn find_active(&self, tenant: TenantId, key: &DedupKey) -> Result<Option<Alert>, EngineError>;

    fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Alert>, EngineError>;

    /// All alerts of the tenant, oldest first.
    fn list(&self, tenant: TenantId) -> Result<Vec<Alert>, EngineError>;

    /// Apply a validated status transition and return the updated alert.
    fn update_status(
        &self,
        tenant: TenantId,
        id: Uuid,
        status: AlertStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Alert, EngineError>;

    fn counts_by_status(&self, tenant: TenantId) -> Result<BTreeMap<AlertStatus, usize>, EngineError>;

    fn counts_by_type(&self, tenant: TenantId) -> Result<BTreeMap<AlertType, usize>, EngineError>;

    /// Permanently delete alerts in `statuses` whose `resolved_at` is
    /// strictly before `older_than`. Returns how many were removed.
    fn archive(
        &self,
        tenant: TenantId,
        statuses: &[AlertStatus],
        older_than: DateTime<Utc>,
    ) -> Result<usize, EngineError>;
}

/// Concurrent in-memory alert store.
///
/// The active-key index is a separate map whose entry lock provides the
/// atomic insert-if-absent.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: DashMap<Uuid, Alert>,
    active: DashMap<(TenantId, DedupKey), Uuid>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted alerts.
    pub fn from_alerts(alerts: Vec<Alert>) -> Self {
        let store = Self::new();
        for alert in alerts {
            if alert.status().is_active() {
                let key = (alert.tenant_id(), alert.dedup_key().clone());
                match store.active.entry(key) {
                    Entry::Occupied(existing) => warn!(
                        "tenant {}: alert {} shares active dedup key with {}; not indexed",
                        alert.tenant_id(),
                        alert.id(),
                        existing.get()
                    ),
                    Entry::Vacant(slot) => {
                        slot.insert(alert.id());
                    }
                }
            }
            store.alerts.insert(alert.id(), alert);
        }
        store
    }

    /// Every stored alert across tenants, ordered by tenant then creation.
    pub fn all_alerts(&self) -> Vec<Alert> {
        let mut all: Vec<Alert> = self.alerts.iter().map(|a| a.value().clone()).collect();
        all.sort_by(|a, b| {
            (a.tenant_id(), a.created_at(), a.id()).cmp(&(b.tenant_id(), b.created_at(), b.id()))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl AlertStore for MemoryAlertStore {
    fn insert_if_absent(&self, alert: Alert) -> Result<bool, EngineError> {
        let key = (alert.tenant_id(), alert.dedup_key().clone());
        match self.active.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(alert.id());
                self.alerts.insert(alert.id(), alert);
                Ok(true)
            }
        }
    }

    fn find_active(&self, tenant: TenantId, key: &DedupKey) -> Result<Option<Alert>, EngineError> {
        let id = match self.active.get(&(tenant, key.clone())) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.alerts.get(&id).map(|a| a.value().clone()))
    }

    fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Alert>, EngineError> {
        Ok(self
            .alerts
            .get(&id)
            .filter(|a| a.tenant_id() == tenant)
            .map(|a| a.value().clone()))
    }

    fn list(&self, tenant: TenantId) -> Result<Vec<Alert>, EngineError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| a.tenant_id() == tenant)
            .map(|a| a.value().clone())
            .collect();
        alerts.sort_by(|a, b| (a.created_at(), a.id()).cmp(&(b.created_at(), b.id())));
        Ok(alerts)
    }

    fn update_status(
        &self,
        tenant: TenantId,
        id: Uuid,
        status: AlertStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Alert, EngineError> {
        let updated = {
            let mut entry = self
                .alerts
                .get_mut(&id)
                .filter(|a| a.tenant_id() == tenant)
                .ok_or(EngineError::AlertNotFound(id))?;
            entry.transition(status, notes, at)?;
            entry.value().clone()
        };
        // The alerts guard is released before touching the index so the two
        // maps are never locked in opposite orders.
        if updated.status().is_terminal() {
            self.active
                .remove_if(&(tenant, updated.dedup_key().clone()), |_, holder| *holder == id);
        }
        debug!("tenant {}: alert {} -> {}", tenant, id, updated.status());
        Ok(updated)
    }

    fn counts_by_status(&self, tenant: TenantId) -> Result<BTreeMap<AlertStatus, usize>, EngineError> {
        let mut counts = BTreeMap::new();
        for alert in self.alerts.iter().filter(|a| a.tenant_id() == tenant) {
            *counts.entry(alert.status()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn counts_by_type(&self, tenant: TenantId) -> Result<BTreeMap<AlertType, usize>, EngineError> {
        let mut counts = BTreeMap::new();
        for alert in self.alerts.iter().filter(|a| a.tenant_id() == tenant) {
            *counts.entry(alert.alert_type()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn archive(
        &self,
        tenant: TenantId,
        statuses: &[AlertStatus],
        older_than: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let mut removed = 0;
        self.alerts.retain(|_, alert| {
            let expired = alert.tenant_id() == tenant
                && statuses.contains(&alert.status())
                && alert.status().is_terminal()
                && alert.resolved_at().is_some_and(|at| at < older_than);
            if expired {
                removed += 1;
            }
            !expired
        });
        Ok(removed)
    }
}

/// Alert store persisted as a JSON document.
///
/// Loads the whole file on open and rewrites it on [`persist`](Self::persist)
/// through a temporary file and rename, so a crash mid-write leaves the
/// previous version intact.
#[derive(Debug)]
pub struct JsonFileAlertStore {
    path: PathBuf,
    inner: MemoryAlertStore,
}

impl JsonFileAlertStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                EngineError::TransientStore(format!("cannot read alerts {}: {}", path.display(), e))
            })?;
            let alerts: Vec<Alert> = if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            };
            MemoryAlertStore::from_alerts(alerts)
        } else {
            MemoryAlertStore::new()
        };
        Ok(Self { path, inner })
    }

    pub fn persist(&self) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(&self.inner.all_alerts())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("persisted {} alerts to {}", self.inner.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl AlertStore for JsonFileAlertStore {
    fn insert_if_absent(&self, alert: Alert) -> Result<bool, EngineError> {
        self.inner.insert_if_absent(alert)
    }

    fn find_active(&self, tenant: TenantId, key: &DedupKey) -> Result<Option<Alert>, EngineError> {
        self.inner.find_active(tenant, key)
    }

    fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Alert>, EngineError> {
        self.inner.get(tenant, id)
    }

    fn list(&self, tenant: TenantId) -> Result<Vec<Alert>, EngineError> {
        self.inner.list(tenant)
    }

    fn update_status(
        &self,
        tenant: TenantId,
        id: Uuid,
        status: AlertStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Alert, EngineError> {
        self.inner.update_status(tenant, id, status, notes, at)
    }

    fn counts_by_status(&self, tenant: TenantId) -> Result<BTreeMap<AlertStatus, usize>, EngineError> {
        self.inner.counts_by_status(tenant)
    }

    fn counts_by_type(&self, tenant: TenantId) -> Result<BTreeMap<AlertType, usize>, EngineError> {
        self.inner.counts_by_type(tenant)
    }

    fn archive(
        &self,
        tenant: TenantId,
        statuses: &[AlertStatus],
        older_than: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        self.inner.archive(tenant, statuses, older_than)
    }
}
