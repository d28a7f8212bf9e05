use crate::alerts::evidence::Evidence;
use crate::core::config::SeverityBands;
use crate::core::error::EngineError;
use crate::core::tenant::TenantId;
use crate::core::user::UserId;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// The heuristic family that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LargeTransfer,
    HighVelocity,
    CircularTransfer,
    InactiveHighBalance,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::LargeTransfer,
        AlertType::HighVelocity,
        AlertType::CircularTransfer,
        AlertType::InactiveHighBalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LargeTransfer => "large_transfer",
            AlertType::HighVelocity => "high_velocity",
            AlertType::CircularTransfer => "circular_transfer",
            AlertType::InactiveHighBalance => "inactive_high_balance",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify an excess ratio (observed measure / threshold).
    ///
    /// Monotonic: a larger ratio never yields a lower severity.
    ///
    /// ```
    /// use credit_watch::alerts::Severity;
    /// use credit_watch::core::config::SeverityBands;
    /// use rust_decimal_macros::dec;
    ///
    /// let bands = SeverityBands::default();
    /// assert_eq!(Severity::from_ratio(dec!(1.1), &bands), Severity::Low);
    /// assert_eq!(Severity::from_ratio(dec!(6), &bands), Severity::Critical);
    /// ```
    pub fn from_ratio(ratio: Decimal, bands: &SeverityBands) -> Self {
        if ratio >= bands.critical {
            Severity::Critical
        } else if ratio >= bands.high {
            Severity::High
        } else if ratio >= bands.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of an alert.
///
/// ```text
/// new ──> reviewing ──> resolved
///  │           └──────> dismissed
///  └──────────────────> dismissed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Reviewing,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 4] = [
        AlertStatus::New,
        AlertStatus::Reviewing,
        AlertStatus::Resolved,
        AlertStatus::Dismissed,
    ];

    /// Active alerts hold their dedup key.
    pub fn is_active(&self) -> bool {
        matches!(self, AlertStatus::New | AlertStatus::Reviewing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::New, AlertStatus::Reviewing)
                | (AlertStatus::New, AlertStatus::Dismissed)
                | (AlertStatus::Reviewing, AlertStatus::Resolved)
                | (AlertStatus::Reviewing, AlertStatus::Dismissed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Reviewing => "reviewing",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse time slot a finding is attributed to for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// The finding has no anchoring timestamp (e.g. a never-active account).
    Never,
    Slot(i64),
}

impl TimeBucket {
    /// Bucket `anchor` into slots of `width` since the Unix epoch.
    pub fn of(anchor: Option<DateTime<Utc>>, width: Duration) -> Self {
        let width = width.num_seconds().max(1);
        match anchor {
            Some(at) => TimeBucket::Slot(at.timestamp().div_euclid(width)),
            None => TimeBucket::Never,
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Never => f.write_str("never"),
            TimeBucket::Slot(n) => write!(f, "{}", n),
        }
    }
}

/// Deterministic fingerprint of an alert's logical identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// SHA-256 over tenant, type, sorted subjects and time bucket.
    ///
    /// Subjects are taken from a `BTreeSet`, so the key does not depend on
    /// the order in which a heuristic discovered them.
    pub fn compute(
        tenant: TenantId,
        alert_type: AlertType,
        subjects: &BTreeSet<UserId>,
        bucket: TimeBucket,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tenant.get().to_be_bytes());
        hasher.update(b"|");
        hasher.update(alert_type.as_str().as_bytes());
        for user in subjects {
            hasher.update(b"|");
            hasher.update((user.as_str().len() as u64).to_be_bytes());
            hasher.update(user.as_str().as_bytes());
        }
        hasher.update(b"|");
        hasher.update(bucket.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A suspected abuse pattern awaiting (or past) human review.
///
/// Severity, subjects, evidence and dedup key are fixed at creation; only
/// status, notes and resolution time change afterwards, and only along the
/// transitions allowed by [`AlertStatus::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    id: Uuid,
    tenant_id: TenantId,
    #[serde(rename = "type")]
    alert_type: AlertType,
    severity: Severity,
    status: AlertStatus,
    subject_user_ids: BTreeSet<UserId>,
    evidence: Evidence,
    dedup_key: DedupKey,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution_notes: Option<String>,
}

impl Alert {
    pub fn new(
        tenant_id: TenantId,
        alert_type: AlertType,
        severity: Severity,
        subject_user_ids: BTreeSet<UserId>,
        evidence: Evidence,
        dedup_key: DedupKey,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            alert_type,
            severity,
            status: AlertStatus::New,
            subject_user_ids,
            evidence,
            dedup_key,
            created_at,
            resolved_at: None,
            resolution_notes: None,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn alert_type(&self) -> AlertType {
        self.alert_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> AlertStatus {
        self.status
    }

    pub fn subject_user_ids(&self) -> &BTreeSet<UserId> {
        &self.subject_user_ids
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    pub fn dedup_key(&self) -> &DedupKey {
        &self.dedup_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn resolution_notes(&self) -> Option<&str> {
        self.resolution_notes.as_deref()
    }

    /// Move to `next`, stamping `resolved_at` when entering a terminal state.
    pub(crate) fn transition(
        &mut self,
        next: AlertStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.resolved_at = Some(at);
        }
        if let Some(notes) = notes {
            self.resolution_notes = Some(notes);
        }
        Ok(())
    }
}
