use crate::core::error::EngineError;
use crate::core::tenant::{Tenant, TenantId};
use crate::core::transaction::{Transaction, TransactionStatus};
use crate::core::user::UserId;
use crate::ledger::reader::{AccountSnapshot, LedgerReader, TenantRegistry};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// One tenant's slice of the ledger.
#[derive(Debug, Clone)]
struct TenantLedger {
    tenant: Tenant,
    /// Ordered by (created_at, id).
    transactions: Vec<Transaction>,
    accounts: BTreeSet<UserId>,
    /// user -> balance, starting at the opening balance.
    positions: HashMap<UserId, Decimal>,
    last_activity: HashMap<UserId, DateTime<Utc>>,
}

impl TenantLedger {
    fn new(tenant: Tenant) -> Self {
        Self {
            tenant,
            transactions: Vec::new(),
            accounts: BTreeSet::new(),
            positions: HashMap::new(),
            last_activity: HashMap::new(),
        }
    }

    fn touch(&mut self, user: &UserId, at: DateTime<Utc>) {
        let entry = self.last_activity.entry(user.clone()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// Committed transfers move credits and count as activity; anything
    /// else is stored for the heuristics to reject but changes no balance.
    fn apply_transaction(&mut self, tx: &Transaction) {
        self.accounts.insert(tx.sender_id().clone());
        self.accounts.insert(tx.receiver_id().clone());
        if tx.status() != TransactionStatus::Committed || tx.amount() <= Decimal::ZERO {
            return;
        }
        *self
            .positions
            .entry(tx.sender_id().clone())
            .or_insert(Decimal::ZERO) -= tx.amount();
        *self
            .positions
            .entry(tx.receiver_id().clone())
            .or_insert(Decimal::ZERO) += tx.amount();
        self.touch(tx.sender_id(), tx.created_at());
        self.touch(tx.receiver_id(), tx.created_at());
    }
}

/// In-memory ledger holding the committed history of many tenants.
///
/// Serves as both [`LedgerReader`] and [`TenantRegistry`] for the CLI
/// (loaded from a JSON snapshot file) and for tests.
///
/// # Examples
///
/// ```
/// use credit_watch::core::tenant::Tenant;
/// use credit_watch::core::transaction::Transaction;
/// use credit_watch::core::user::UserId;
/// use credit_watch::ledger::{LedgerReader, LedgerSnapshot};
/// use chrono::Utc;
/// use rust_decimal_macros::dec;
///
/// let tenant = Tenant::new(1, "riverside");
/// let mut ledger = LedgerSnapshot::new();
/// ledger.add_tenant(tenant.clone());
/// ledger.add_transaction(Transaction::new(
///     1, tenant.id, UserId::new("a"), UserId::new("b"), dec!(4), Utc::now(),
/// )).unwrap();
///
/// let b = ledger.balance_and_last_activity(tenant.id, &UserId::new("b")).unwrap();
/// assert_eq!(b.balance, dec!(4));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    tenants: BTreeMap<TenantId, TenantLedger>,
}

impl LedgerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant, or replace the record of a known one while keeping
    /// its transactions.
    pub fn add_tenant(&mut self, tenant: Tenant) {
        match self.tenants.entry(tenant.id) {
            Entry::Occupied(mut slot) => slot.get_mut().tenant = tenant,
            Entry::Vacant(slot) => {
                slot.insert(TenantLedger::new(tenant));
            }
        }
    }

    fn tenant_mut(&mut self, tenant: TenantId) -> Result<&mut TenantLedger, EngineError> {
        self.tenants
            .get_mut(&tenant)
            .ok_or_else(|| EngineError::TenantIsolation {
                tenant,
                reason: "tenant is not present in the ledger".into(),
            })
    }

    fn tenant_ref(&self, tenant: TenantId) -> Result<&TenantLedger, EngineError> {
        self.tenants
            .get(&tenant)
            .ok_or_else(|| EngineError::TenantIsolation {
                tenant,
                reason: "tenant is not present in the ledger".into(),
            })
    }

    /// Register an account with its opening balance and, optionally, an
    /// activity timestamp recorded before the transactions in this snapshot.
    pub fn add_account(
        &mut self,
        tenant: TenantId,
        user: UserId,
        opening_balance: Decimal,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        let ledger = self.tenant_mut(tenant)?;
        *ledger
            .positions
            .entry(user.clone())
            .or_insert(Decimal::ZERO) += opening_balance;
        if let Some(at) = last_activity_at {
            ledger.touch(&user, at);
        }
        ledger.accounts.insert(user);
        Ok(())
    }

    /// Append a transaction to its tenant's history, keeping time order.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), EngineError> {
        let ledger = self.tenant_mut(tx.tenant_id())?;
        ledger.apply_transaction(&tx);
        let key = (tx.created_at(), tx.id());
        let pos = ledger
            .transactions
            .partition_point(|t| (t.created_at(), t.id()) <= key);
        ledger.transactions.insert(pos, tx);
        Ok(())
    }

    pub fn transaction_count(&self, tenant: TenantId) -> usize {
        self.tenants
            .get(&tenant)
            .map(|l| l.transactions.len())
            .unwrap_or(0)
    }

    pub fn from_file(file: SnapshotFile) -> Result<Self, EngineError> {
        let mut ledger = Self::new();
        for input in file.tenants {
            let tenant = Tenant {
                id: TenantId::new(input.id),
                slug: input.slug,
                active: input.active,
            };
            let tenant_id = tenant.id;
            ledger.add_tenant(tenant);
            for account in input.accounts {
                ledger.add_account(
                    tenant_id,
                    account.user_id,
                    account.opening_balance,
                    account.last_activity_at,
                )?;
            }
            for tx in input.transactions {
                ledger.add_transaction(
                    Transaction::new(
                        tx.id,
                        tenant_id,
                        tx.sender_id,
                        tx.receiver_id,
                        tx.amount,
                        tx.created_at,
                    )
                    .with_status(tx.status),
                )?;
            }
        }
        Ok(ledger)
    }

    /// Load a snapshot from a JSON file. Any failure to read it is a store outage.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::TransientStore(format!("cannot read ledger {}: {}", path.display(), e))
        })?;
        let file: SnapshotFile = serde_json::from_str(&content)?;
        Self::from_file(file)
    }
}

impl LedgerReader for LedgerSnapshot {
    fn query(
        &self,
        tenant: TenantId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, EngineError> {
        let ledger = self.tenant_ref(tenant)?;
        let start = ledger
            .transactions
            .partition_point(|t| t.created_at() < since);
        Ok(ledger.transactions[start..]
            .iter()
            .take_while(|t| t.created_at() <= until)
            .cloned()
            .collect())
    }

    fn balance_and_last_activity(
        &self,
        tenant: TenantId,
        user: &UserId,
    ) -> Result<AccountSnapshot, EngineError> {
        let ledger = self.tenant_ref(tenant)?;
        Ok(AccountSnapshot {
            balance: ledger.positions.get(user).copied().unwrap_or(Decimal::ZERO),
            last_activity_at: ledger.last_activity.get(user).copied(),
        })
    }

    fn list_users(&self, tenant: TenantId) -> Result<Vec<UserId>, EngineError> {
        Ok(self.tenant_ref(tenant)?.accounts.iter().cloned().collect())
    }
}

impl TenantRegistry for LedgerSnapshot {
    fn list_active_tenants(&self) -> Result<Vec<Tenant>, EngineError> {
        Ok(self
            .tenants
            .values()
            .filter(|l| l.tenant.active)
            .map(|l| l.tenant.clone())
            .collect())
    }
}

// --- JSON snapshot schema ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub tenants: Vec<TenantInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInput {
    pub id: u64,
    pub slug: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub accounts: Vec<AccountInput>,
    #[serde(default)]
    pub transactions: Vec<TransactionInput>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInput {
    pub user_id: UserId,
    #[serde(default)]
    pub opening_balance: Decimal,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    pub id: u64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: TransactionStatus,
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Committed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ledger_with(txs: &[(u64, &str, &str, Decimal, i64)]) -> LedgerSnapshot {
        let tenant = Tenant::new(1, "t");
        let mut ledger = LedgerSnapshot::new();
        ledger.add_tenant(tenant.clone());
        for &(id, from, to, amount, minutes) in txs {
            ledger
                .add_transaction(Transaction::new(
                    id,
                    tenant.id,
                    UserId::new(from),
                    UserId::new(to),
                    amount,
                    t0() + Duration::minutes(minutes),
                ))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn test_query_is_ordered_and_inclusive() {
        let ledger = ledger_with(&[
            (3, "a", "b", dec!(1), 30),
            (1, "a", "b", dec!(1), 0),
            (2, "b", "c", dec!(1), 10),
        ]);
        let txs = ledger
            .query(TenantId::new(1), t0(), t0() + Duration::minutes(10))
            .unwrap();
        let ids: Vec<u64> = txs.iter().map(|t| t.id().get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_balances_conserve_credits() {
        let ledger = ledger_with(&[(1, "a", "b", dec!(10), 0), (2, "b", "c", dec!(4), 5)]);
        let tenant = TenantId::new(1);
        let total: Decimal = ["a", "b", "c"]
            .iter()
            .map(|u| {
                ledger
                    .balance_and_last_activity(tenant, &UserId::new(*u))
                    .unwrap()
                    .balance
            })
            .sum();
        assert_eq!(total, Decimal::ZERO);
        let b = ledger
            .balance_and_last_activity(tenant, &UserId::new("b"))
            .unwrap();
        assert_eq!(b.balance, dec!(6));
        assert_eq!(b.last_activity_at, Some(t0() + Duration::minutes(5)));
    }

    #[test]
    fn test_recorded_activity_used_without_transactions() {
        let mut ledger = ledger_with(&[]);
        let seen = t0() - Duration::days(100);
        ledger
            .add_account(TenantId::new(1), UserId::new("z"), dec!(15), Some(seen))
            .unwrap();
        let z = ledger
            .balance_and_last_activity(TenantId::new(1), &UserId::new("z"))
            .unwrap();
        assert_eq!(z.balance, dec!(15));
        assert_eq!(z.last_activity_at, Some(seen));
        assert_eq!(ledger.list_users(TenantId::new(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_tenant_is_isolation_error() {
        let ledger = ledger_with(&[]);
        let err = ledger
            .query(TenantId::new(2), t0(), t0())
            .unwrap_err();
        assert_eq!(err.kind(), "tenant_isolation");
    }

    #[test]
    fn test_re_adding_tenant_keeps_transactions() {
        let mut ledger = ledger_with(&[(1, "a", "b", dec!(3), 0)]);
        let mut renamed = Tenant::new(1, "renamed");
        renamed.active = false;
        ledger.add_tenant(renamed);
        assert_eq!(ledger.transaction_count(TenantId::new(1)), 1);
        assert!(ledger.list_active_tenants().unwrap().is_empty());
    }

    #[test]
    fn test_registry_lists_only_active() {
        let mut ledger = ledger_with(&[]);
        let mut closed = Tenant::new(2, "closed");
        closed.active = false;
        ledger.add_tenant(closed);
        let active = ledger.list_active_tenants().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slug, "t");
    }

    #[test]
    fn test_snapshot_file_parses() {
        let json = r#"{
            "tenants": [{
                "id": 5, "slug": "hillside",
                "accounts": [{ "user_id": "ann", "opening_balance": "20" }],
                "transactions": [{
                    "id": 1, "sender_id": "ann", "receiver_id": "ben",
                    "amount": "2.5", "created_at": "2026-03-01T12:00:00Z"
                }]
            }]
        }"#;
        let file: SnapshotFile = serde_json::from_str(json).unwrap();
        let ledger = LedgerSnapshot::from_file(file).unwrap();
        let ann = ledger
            .balance_and_last_activity(TenantId::new(5), &UserId::new("ann"))
            .unwrap();
        assert_eq!(ann.balance, dec!(17.5));
        assert_eq!(ledger.transaction_count(TenantId::new(5)), 1);
    }
}
