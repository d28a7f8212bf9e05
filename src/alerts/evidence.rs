use crate::core::transaction::{Transaction, TransactionId};
use crate::core::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Copy of a ledger transaction frozen into an alert at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceTransaction {
    pub id: TransactionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for EvidenceTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id(),
            sender_id: tx.sender_id().clone(),
            receiver_id: tx.receiver_id().clone(),
            amount: tx.amount(),
            created_at: tx.created_at(),
        }
    }
}

/// Structured payload explaining why an alert was raised.
///
/// Evidence is written once when the alert is created and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    LargeTransfer {
        threshold: Decimal,
        transactions: Vec<EvidenceTransaction>,
        total_amount: Decimal,
        largest_amount: Decimal,
    },
    HighVelocity {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        threshold: usize,
        observed_count: usize,
        transactions: Vec<EvidenceTransaction>,
    },
    CircularTransfer {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        /// Users in loop order; the last hop returns to the first user.
        path: Vec<UserId>,
        /// Hops in traversal order.
        hops: Vec<EvidenceTransaction>,
        total_amount: Decimal,
    },
    InactiveHighBalance {
        balance: Decimal,
        threshold: Decimal,
        last_activity_at: Option<DateTime<Utc>>,
        inactivity_days: i64,
    },
}

impl Evidence {
    /// Ledger transactions this evidence refers to, in evidence order.
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        match self {
            Evidence::LargeTransfer { transactions, .. }
            | Evidence::HighVelocity { transactions, .. } => {
                transactions.iter().map(|t| t.id).collect()
            }
            Evidence::CircularTransfer { hops, .. } => hops.iter().map(|t| t.id).collect(),
            Evidence::InactiveHighBalance { .. } => Vec::new(),
        }
    }

    /// Cumulative credits referenced by the evidence, if it is transfer-based.
    pub fn total_amount(&self) -> Option<Decimal> {
        match self {
            Evidence::LargeTransfer { total_amount, .. }
            | Evidence::CircularTransfer { total_amount, .. } => Some(*total_amount),
            Evidence::HighVelocity { transactions, .. } => {
                Some(transactions.iter().map(|t| t.amount).sum())
            }
            Evidence::InactiveHighBalance { .. } => None,
        }
    }

    pub fn references(&self, id: TransactionId) -> bool {
        self.transaction_ids().contains(&id)
    }
}
