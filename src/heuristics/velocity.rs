use super::{read_valid_window, Finding, Heuristic, HeuristicOutcome};
use crate::alerts::alert::AlertType;
use crate::alerts::evidence::{Evidence, EvidenceTransaction};
use crate::core::config::DetectionConfig;
use crate::core::error::EngineError;
use crate::core::tenant::TenantScope;
use crate::core::transaction::Transaction;
use crate::core::user::UserId;
use crate::ledger::LedgerReader;
use log::debug;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Flags senders with more than `velocity_threshold` outgoing transfers in
/// the window `[now - velocity_window, now]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityHeuristic;

impl Heuristic for VelocityHeuristic {
    fn alert_type(&self) -> AlertType {
        AlertType::HighVelocity
    }

    fn scan(
        &self,
        scope: &TenantScope,
        ledger: &dyn LedgerReader,
        config: &DetectionConfig,
    ) -> Result<HeuristicOutcome, EngineError> {
        let mut outcome = HeuristicOutcome::default();
        let window_end = scope.now();
        let window_start = window_end - config.velocity_window();
        let txs = read_valid_window(
            scope,
            ledger,
            window_start,
            window_end,
            self.alert_type(),
            &mut outcome.skipped,
        )?;

        let mut by_sender: BTreeMap<&UserId, Vec<&Transaction>> = BTreeMap::new();
        for tx in &txs {
            if scope.is_expired() {
                outcome.interrupted = true;
                break;
            }
            by_sender.entry(tx.sender_id()).or_default().push(tx);
        }

        let threshold = config.velocity_threshold;
        for (sender, sent) in by_sender {
            if sent.len() <= threshold {
                continue;
            }
            outcome.findings.push(Finding {
                alert_type: AlertType::HighVelocity,
                subjects: BTreeSet::from([sender.clone()]),
                ratio: Decimal::from(sent.len()) / Decimal::from(threshold.max(1)),
                anchor: sent.iter().map(|t| t.created_at()).max(),
                evidence: Evidence::HighVelocity {
                    window_start,
                    window_end,
                    threshold,
                    observed_count: sent.len(),
                    transactions: sent.iter().map(|t| EvidenceTransaction::from(*t)).collect(),
                },
            });
        }

        debug!(
            "tenant {}: high_velocity scanned {} transfers, {} findings",
            scope.tenant(),
            txs.len(),
            outcome.findings.len()
        );
        Ok(outcome)
    }
}
