//! Random multi-tenant ledger generation.
//!
//! Background traffic is uniform noise between members. On top of it the
//! generator plants the patterns the heuristics look for: forward-in-time
//! transfer triangles and dormant accounts holding credits.

use crate::core::transaction::TransactionStatus;
use crate::core::user::UserId;
use crate::ledger::snapshot::{AccountInput, SnapshotFile, TenantInput, TransactionInput};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Shape of a generated ledger.
#[derive(Debug, Clone)]
pub struct LedgerProfile {
    pub tenant_count: usize,
    pub users_per_tenant: usize,
    /// Background transfers per tenant, not counting planted patterns.
    pub transactions_per_tenant: usize,
    /// Background transfers are spread over `[now - span_hours, now]`.
    pub span_hours: i64,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Three-member loops planted per tenant inside the last few hours.
    pub planted_cycles: usize,
    /// Accounts per tenant with credits and no activity for 100+ days.
    pub dormant_accounts: usize,
    /// Fixed seed for reproducible output; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for LedgerProfile {
    fn default() -> Self {
        Self {
            tenant_count: 3,
            users_per_tenant: 25,
            transactions_per_tenant: 200,
            span_hours: 48,
            min_amount: Decimal::ONE,
            max_amount: Decimal::from(40),
            planted_cycles: 1,
            dormant_accounts: 2,
            seed: None,
        }
    }
}

fn random_amount(rng: &mut StdRng, min: Decimal, max: Decimal) -> Decimal {
    let steps = rng.gen_range(0..=1000u32);
    (min + (max - min) * Decimal::from(steps) / Decimal::from(1000)).round_dp(2)
}

/// Generate a ledger snapshot ending at `now`.
pub fn generate_snapshot(profile: &LedgerProfile, now: DateTime<Utc>) -> SnapshotFile {
    let mut rng = match profile.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let users: Vec<UserId> = (0..profile.users_per_tenant.max(2))
        .map(|i| UserId::new(format!("member-{:03}", i)))
        .collect();
    let span_secs = (profile.span_hours.max(1) * 3600).max(1);

    let mut file = SnapshotFile::default();
    for t in 0..profile.tenant_count {
        let mut tenant = TenantInput {
            id: t as u64 + 1,
            slug: format!("community-{}", t + 1),
            active: true,
            accounts: Vec::new(),
            transactions: Vec::new(),
        };
        let mut next_id = 1u64;

        for user in &users {
            tenant.accounts.push(AccountInput {
                user_id: user.clone(),
                opening_balance: Decimal::from(rng.gen_range(5..=50i64)),
                last_activity_at: None,
            });
        }

        for _ in 0..profile.transactions_per_tenant {
            let sender = rng.gen_range(0..users.len());
            let mut receiver = rng.gen_range(0..users.len());
            while receiver == sender {
                receiver = rng.gen_range(0..users.len());
            }
            tenant.transactions.push(TransactionInput {
                id: next_id,
                sender_id: users[sender].clone(),
                receiver_id: users[receiver].clone(),
                amount: random_amount(&mut rng, profile.min_amount, profile.max_amount),
                created_at: now - Duration::seconds(rng.gen_range(0..span_secs)),
                status: TransactionStatus::Committed,
            });
            next_id += 1;
        }

        for c in 0..profile.planted_cycles {
            let ring = [
                UserId::new(format!("ring-{}-a", c)),
                UserId::new(format!("ring-{}-b", c)),
                UserId::new(format!("ring-{}-c", c)),
            ];
            let start = now - Duration::minutes(rng.gen_range(120..600));
            let amount = random_amount(&mut rng, Decimal::from(10), Decimal::from(100));
            for hop in 0..3 {
                tenant.transactions.push(TransactionInput {
                    id: next_id,
                    sender_id: ring[hop].clone(),
                    receiver_id: ring[(hop + 1) % 3].clone(),
                    amount,
                    created_at: start + Duration::minutes(30 * hop as i64),
                    status: TransactionStatus::Committed,
                });
                next_id += 1;
            }
        }

        for d in 0..profile.dormant_accounts {
            tenant.accounts.push(AccountInput {
                user_id: UserId::new(format!("dormant-{:03}", d)),
                opening_balance: Decimal::from(rng.gen_range(15..=120i64)),
                last_activity_at: Some(now - Duration::days(rng.gen_range(100..400))),
            });
        }

        file.tenants.push(tenant);
    }
    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DetectionConfig;
    use crate::core::tenant::{Tenant, TenantScope};
    use crate::heuristics::{CircularTransferHeuristic, Heuristic, InactiveHighBalanceHeuristic};
    use crate::ledger::LedgerSnapshot;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generated_shape() {
        let profile = LedgerProfile {
            tenant_count: 2,
            users_per_tenant: 10,
            transactions_per_tenant: 50,
            planted_cycles: 2,
            seed: Some(7),
            ..Default::default()
        };
        let file = generate_snapshot(&profile, now());
        assert_eq!(file.tenants.len(), 2);
        for tenant in &file.tenants {
            assert_eq!(tenant.transactions.len(), 50 + 2 * 3);
            assert!(tenant.transactions.iter().all(|t| t.sender_id != t.receiver_id));
            assert!(tenant.transactions.iter().all(|t| t.amount > Decimal::ZERO));
            assert!(tenant.transactions.iter().all(|t| t.created_at <= now()));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let profile = LedgerProfile {
            seed: Some(42),
            ..Default::default()
        };
        let a = serde_json::to_string(&generate_snapshot(&profile, now())).unwrap();
        let b = serde_json::to_string(&generate_snapshot(&profile, now())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_planted_patterns_are_detected() {
        let profile = LedgerProfile {
            tenant_count: 1,
            seed: Some(3),
            ..Default::default()
        };
        let ledger = LedgerSnapshot::from_file(generate_snapshot(&profile, now())).unwrap();
        let scope = TenantScope::new(Tenant::new(1, "community-1"), now()).unwrap();
        let config = DetectionConfig::default();

        let cycles = CircularTransferHeuristic.scan(&scope, &ledger, &config).unwrap();
        assert!(cycles
            .findings
            .iter()
            .any(|f| f.subjects.iter().all(|u| u.as_str().starts_with("ring-0-"))));

        let dormant = InactiveHighBalanceHeuristic.scan(&scope, &ledger, &config).unwrap();
        let flagged: Vec<_> = dormant
            .findings
            .iter()
            .flat_map(|f| f.subjects.iter())
            .filter(|u| u.as_str().starts_with("dormant-"))
            .collect();
        assert_eq!(flagged.len(), 2);
    }
}
