use super::{Finding, Heuristic, HeuristicOutcome};
use crate::alerts::alert::AlertType;
use crate::alerts::evidence::Evidence;
use crate::core::config::DetectionConfig;
use crate::core::error::EngineError;
use crate::core::tenant::TenantScope;
use crate::ledger::LedgerReader;
use log::{debug, warn};
use std::collections::BTreeSet;

/// Flags dormant accounts sitting on credits: balance strictly above
/// `inactive_balance_threshold` and no activity for `inactivity_days`.
///
/// An account that never transacted counts as dormant.
#[derive(Debug, Clone, Copy, Default)]
pub struct InactiveHighBalanceHeuristic;

impl Heuristic for InactiveHighBalanceHeuristic {
    fn alert_type(&self) -> AlertType {
        AlertType::InactiveHighBalance
    }

    fn scan(
        &self,
        scope: &TenantScope,
        ledger: &dyn LedgerReader,
        config: &DetectionConfig,
    ) -> Result<HeuristicOutcome, EngineError> {
        let mut outcome = HeuristicOutcome::default();
        let cutoff = scope.now() - config.inactivity_window();
        let threshold = config.inactive_balance_threshold;
        let users = ledger.list_users(scope.tenant_id())?;

        for user in &users {
            if scope.is_expired() {
                outcome.interrupted = true;
                break;
            }
            if user.is_empty() {
                warn!("tenant {}: skipping account with empty user id", scope.tenant());
                outcome.skipped.push(user.to_string());
                continue;
            }
            let account = match ledger.balance_and_last_activity(scope.tenant_id(), user) {
                Ok(account) => account,
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("tenant {}: skipping account {} ({})", scope.tenant(), user, e);
                    outcome.skipped.push(user.to_string());
                    continue;
                }
            };
            let dormant = account.last_activity_at.map_or(true, |at| at < cutoff);
            if account.balance <= threshold || !dormant {
                continue;
            }
            outcome.findings.push(Finding {
                alert_type: AlertType::InactiveHighBalance,
                subjects: BTreeSet::from([user.clone()]),
                ratio: account.balance / threshold,
                anchor: account.last_activity_at,
                evidence: Evidence::InactiveHighBalance {
                    balance: account.balance,
                    threshold,
                    last_activity_at: account.last_activity_at,
                    inactivity_days: config.inactivity_days,
                },
            });
        }

        debug!(
            "tenant {}: inactive_high_balance checked {} accounts, {} findings",
            scope.tenant(),
            users.len(),
            outcome.findings.len()
        );
        Ok(outcome)
    }
}
