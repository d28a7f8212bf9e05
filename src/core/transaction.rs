use crate::core::error::EngineError;
use crate::core::tenant::TenantId;
use crate::core::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Committed,
    Pending,
    Failed,
}

/// A committed transfer of time credits between two members.
///
/// Transactions are owned by the ledger. The engine only ever reads them:
/// there is no API here to change one after construction.
///
/// # Examples
///
/// ```
/// use credit_watch::core::tenant::TenantId;
/// use credit_watch::core::transaction::Transaction;
/// use credit_watch::core::user::UserId;
/// use chrono::Utc;
/// use rust_decimal_macros::dec;
///
/// let tx = Transaction::new(
///     1,
///     TenantId::new(1),
///     UserId::new("alice"),
///     UserId::new("bob"),
///     dec!(5),
///     Utc::now(),
/// );
/// assert!(tx.validate(TenantId::new(1)).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    tenant_id: TenantId,
    sender_id: UserId,
    receiver_id: UserId,
    /// Credits moved. Positive for well-formed records.
    amount: Decimal,
    created_at: DateTime<Utc>,
    status: TransactionStatus,
}

impl Transaction {
    /// Build a committed transaction.
    pub fn new(
        id: u64,
        tenant_id: TenantId,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(id),
            tenant_id,
            sender_id,
            receiver_id,
            amount,
            created_at,
            status: TransactionStatus::Committed,
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    // --- Accessors ---

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn sender_id(&self) -> &UserId {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &UserId {
        &self.receiver_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// True when `user` sent or received this transaction.
    pub fn involves(&self, user: &UserId) -> bool {
        &self.sender_id == user || &self.receiver_id == user
    }

    /// Check that the record can be evaluated inside `scope_tenant`.
    pub fn validate(&self, scope_tenant: TenantId) -> Result<(), EngineError> {
        let reason = if self.tenant_id != scope_tenant {
            format!(
                "belongs to tenant {} but was read for tenant {}",
                self.tenant_id, scope_tenant
            )
        } else if self.status != TransactionStatus::Committed {
            format!("status is {:?}, expected committed", self.status)
        } else if self.amount <= Decimal::ZERO {
            format!("amount must be positive, got {}", self.amount)
        } else if self.sender_id.is_empty() || self.receiver_id.is_empty() {
            "missing sender or receiver".to_string()
        } else if self.sender_id == self.receiver_id {
            format!("sender and receiver are both {}", self.sender_id)
        } else {
            return Ok(());
        };
        Err(EngineError::MalformedRecord {
            record: self.id.to_string(),
            reason,
        })
    }
}
