use crate::core::error::EngineError;
use crate::core::tenant::{Tenant, TenantId};
use crate::core::transaction::Transaction;
use crate::core::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current balance and most recent activity of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    /// Latest transaction as sender or receiver; `None` if the account never transacted.
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Query interface over a ledger's committed transactions.
///
/// Implementations must never hand out data of another tenant. Heuristics
/// still validate `tenant_id` on every record they read.
pub trait LedgerReader: Send + Sync {
    /// Transactions with `since <= created_at <= until`, ordered by `created_at`.
    fn query(
        &self,
        tenant: TenantId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, EngineError>;

    fn balance_and_last_activity(
        &self,
        tenant: TenantId,
        user: &UserId,
    ) -> Result<AccountSnapshot, EngineError>;

    /// Every account known to the tenant's ledger.
    fn list_users(&self, tenant: TenantId) -> Result<Vec<UserId>, EngineError>;
}

/// Source of the tenants a batch run iterates over.
pub trait TenantRegistry: Send + Sync {
    fn list_active_tenants(&self) -> Result<Vec<Tenant>, EngineError>;
}
