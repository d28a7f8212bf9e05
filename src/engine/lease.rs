use crate::core::tenant::TenantId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: u64,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Per-tenant advisory leases that keep two runs off the same tenant.
///
/// A lease expires after `ttl` even if its holder never releases it, so a
/// crashed or stuck run cannot block a tenant forever.
#[derive(Debug)]
pub struct LeaseRegistry {
    leases: DashMap<TenantId, Lease>,
    ttl: Duration,
    next_token: AtomicU64,
}

impl LeaseRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
            next_token: AtomicU64::new(1),
        }
    }

    /// Take the tenant's lease, or `None` while another holder's lease is live.
    pub fn try_acquire(&self, tenant: TenantId) -> Option<LeaseGuard<'_>> {
        let now = Instant::now();
        let lease = Lease {
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
            expires_at: now.checked_add(self.ttl),
        };
        match self.leases.entry(tenant) {
            Entry::Occupied(mut held) => {
                if held.get().is_live(now) {
                    return None;
                }
                debug!("tenant {}: taking over expired lease", tenant);
                held.insert(lease);
            }
            Entry::Vacant(slot) => {
                slot.insert(lease);
            }
        }
        Some(LeaseGuard {
            registry: self,
            tenant,
            token: lease.token,
        })
    }

    pub fn is_held(&self, tenant: TenantId) -> bool {
        self.leases
            .get(&tenant)
            .is_some_and(|l| l.is_live(Instant::now()))
    }

    fn release(&self, tenant: TenantId, token: u64) {
        self.leases.remove_if(&tenant, |_, l| l.token == token);
    }
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(900))
    }
}

/// Held lease; released on drop unless a newer holder already took over.
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    registry: &'a LeaseRegistry,
    tenant: TenantId,
    token: u64,
}

impl LeaseGuard<'_> {
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.tenant, self.token);
    }
}
