use crate::core::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier of an isolated community (tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(u64);

impl TenantId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tenant as returned by the tenant registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Tenant {
    pub fn new(id: u64, slug: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(id),
            slug: slug.into(),
            active: true,
        }
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slug, self.id)
    }
}

/// Explicit handle for one tenant's run.
///
/// Every heuristic, store call and lifecycle operation receives the scope
/// instead of reading a "current tenant" from ambient state. The scope also
/// carries the run clock (`now`) and the cooperative cancellation signal used
/// to bound a tenant's wall-clock cost.
///
/// # Examples
///
/// ```
/// use credit_watch::core::tenant::{Tenant, TenantScope};
/// use chrono::Utc;
///
/// let scope = TenantScope::new(Tenant::new(1, "riverside"), Utc::now()).unwrap();
/// assert_eq!(scope.tenant_id().get(), 1);
/// assert!(!scope.is_expired());
/// ```
#[derive(Debug, Clone)]
pub struct TenantScope {
    tenant: Tenant,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl TenantScope {
    /// Open a scope for `tenant`, rejecting inactive or unnamed tenants.
    pub fn new(tenant: Tenant, now: DateTime<Utc>) -> Result<Self, EngineError> {
        if tenant.slug.trim().is_empty() {
            return Err(EngineError::TenantIsolation {
                tenant: tenant.id,
                reason: "tenant has no slug".into(),
            });
        }
        if !tenant.active {
            return Err(EngineError::TenantIsolation {
                tenant: tenant.id,
                reason: "tenant is not active".into(),
            });
        }
        Ok(Self {
            tenant,
            now,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bound this scope to `timeout` of wall-clock time from now. A timeout
    /// too large to represent leaves the scope without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.id
    }

    /// The logical time of this run. All windows are anchored here.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True once the scope was cancelled or its deadline has passed.
    pub fn is_expired(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancelled.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Fail with a tenant isolation error if `other` is not this scope's tenant.
    pub fn ensure_owns(&self, other: TenantId) -> Result<(), EngineError> {
        if other == self.tenant.id {
            Ok(())
        } else {
            Err(EngineError::TenantIsolation {
                tenant: self.tenant.id,
                reason: format!("record belongs to tenant {}", other),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_tenant_rejected() {
        let mut tenant = Tenant::new(3, "closed");
        tenant.active = false;
        let err = TenantScope::new(tenant, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "tenant_isolation");
    }

    #[test]
    fn test_blank_slug_rejected() {
        assert!(TenantScope::new(Tenant::new(3, " "), Utc::now()).is_err());
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let scope = TenantScope::new(Tenant::new(1, "a"), Utc::now())
            .unwrap()
            .with_timeout(Duration::ZERO);
        assert!(scope.is_expired());
    }

    #[test]
    fn test_unbounded_timeout_has_no_deadline() {
        let scope = TenantScope::new(Tenant::new(1, "a"), Utc::now())
            .unwrap()
            .with_timeout(Duration::MAX);
        assert!(!scope.is_expired());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let scope = TenantScope::new(Tenant::new(1, "a"), Utc::now()).unwrap();
        let clone = scope.clone();
        scope.cancel();
        assert!(clone.is_expired());
    }

    #[test]
    fn test_ensure_owns() {
        let scope = TenantScope::new(Tenant::new(1, "a"), Utc::now()).unwrap();
        assert!(scope.ensure_owns(TenantId::new(1)).is_ok());
        assert!(scope.ensure_owns(TenantId::new(2)).is_err());
    }
}
