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

/// Flags single transfers strictly above `large_transfer_threshold`.
///
/// All qualifying transfers between the same two members inside the
/// lookback, in either direction, are merged into one finding. The pair is
/// unordered because the alert's identity is its subject set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargeTransferHeuristic;

impl Heuristic for LargeTransferHeuristic {
    fn alert_type(&self) -> AlertType {
        AlertType::LargeTransfer
    }

    fn scan(
        &self,
        scope: &TenantScope,
        ledger: &dyn LedgerReader,
        config: &DetectionConfig,
    ) -> Result<HeuristicOutcome, EngineError> {
        let mut outcome = HeuristicOutcome::default();
        let until = scope.now();
        let since = until - config.large_transfer_lookback();
        let txs = read_valid_window(
            scope,
            ledger,
            since,
            until,
            self.alert_type(),
            &mut outcome.skipped,
        )?;

        let threshold = config.large_transfer_threshold;
        let mut pairs: BTreeMap<(&UserId, &UserId), Vec<&Transaction>> = BTreeMap::new();
        for tx in &txs {
            if scope.is_expired() {
                outcome.interrupted = true;
                break;
            }
            if tx.amount() > threshold {
                let (a, b) = (tx.sender_id(), tx.receiver_id());
                let pair = if a <= b { (a, b) } else { (b, a) };
                pairs.entry(pair).or_default().push(tx);
            }
        }

        for ((a, b), hits) in pairs {
            let largest = hits.iter().map(|t| t.amount()).max().unwrap_or(Decimal::ZERO);
            let total: Decimal = hits.iter().map(|t| t.amount()).sum();
            let subjects: BTreeSet<UserId> = [a.clone(), b.clone()].into();
            outcome.findings.push(Finding {
                alert_type: AlertType::LargeTransfer,
                subjects,
                ratio: largest / threshold,
                anchor: hits.iter().map(|t| t.created_at()).max(),
                evidence: Evidence::LargeTransfer {
                    threshold,
                    transactions: hits.iter().map(|t| EvidenceTransaction::from(*t)).collect(),
                    total_amount: total,
                    largest_amount: largest,
                },
            });
        }

        debug!(
            "tenant {}: large_transfer scanned {} transfers, {} findings",
            scope.tenant(),
            txs.len(),
            outcome.findings.len()
        );
        Ok(outcome)
    }
}
