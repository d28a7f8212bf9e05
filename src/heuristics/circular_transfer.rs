use super::{read_valid_window, Finding, Heuristic, HeuristicOutcome};
use crate::alerts::alert::AlertType;
use crate::alerts::evidence::{Evidence, EvidenceTransaction};
use crate::core::config::DetectionConfig;
use crate::core::error::EngineError;
use crate::core::tenant::TenantScope;
use crate::core::transaction::{Transaction, TransactionId};
use crate::graph::cycle_detection::find_temporal_cycles;
use crate::graph::transfer_graph::TransferGraph;
use crate::ledger::LedgerReader;
use log::{debug, info};
use std::collections::HashMap;

/// Flags closed loops of time-ordered transfers inside `cycle_window`.
///
/// The loop search itself lives in [`find_temporal_cycles`]; this type
/// feeds it the tenant's window and turns each loop into a finding whose
/// evidence lists the hops in traversal order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircularTransferHeuristic;

impl Heuristic for CircularTransferHeuristic {
    fn alert_type(&self) -> AlertType {
        AlertType::CircularTransfer
    }

    fn scan(
        &self,
        scope: &TenantScope,
        ledger: &dyn LedgerReader,
        config: &DetectionConfig,
    ) -> Result<HeuristicOutcome, EngineError> {
        let mut outcome = HeuristicOutcome::default();
        let window_end = scope.now();
        let window_start = window_end - config.cycle_window();
        let txs = read_valid_window(
            scope,
            ledger,
            window_start,
            window_end,
            self.alert_type(),
            &mut outcome.skipped,
        )?;

        let graph = TransferGraph::from_transactions(&txs);
        let search = find_temporal_cycles(&graph, config.cycle_max_depth, || scope.is_expired());
        outcome.interrupted = search.interrupted;
        if search.interrupted {
            info!(
                "tenant {}: cycle search stopped after {} expansions with {} loops",
                scope.tenant(),
                search.expansions,
                search.cycles.len()
            );
        }

        let by_id: HashMap<TransactionId, &Transaction> = txs.iter().map(|t| (t.id(), t)).collect();
        for cycle in search.cycles {
            let hops: Vec<EvidenceTransaction> = cycle
                .hops
                .iter()
                .filter_map(|h| by_id.get(&h.transaction_id))
                .map(|t| EvidenceTransaction::from(*t))
                .collect();
            let total_amount = cycle.total_amount();
            outcome.findings.push(Finding {
                alert_type: AlertType::CircularTransfer,
                subjects: cycle.users.iter().cloned().collect(),
                ratio: total_amount / config.cycle_reference_amount,
                anchor: cycle.hops.iter().map(|h| h.at).max(),
                evidence: Evidence::CircularTransfer {
                    window_start,
                    window_end,
                    path: cycle.users,
                    hops,
                    total_amount,
                },
            });
        }

        debug!(
            "tenant {}: circular_transfer built graph of {} users / {} transfers, {} findings",
            scope.tenant(),
            graph.node_count(),
            graph.edge_count(),
            outcome.findings.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::alert::Severity;
    use crate::core::user::UserId;
    use crate::heuristics::test_support::{ledger, scope};
    use rust_decimal_macros::dec;

    #[test]
    fn test_two_party_round_trip() {
        let ledger = ledger(&[(1, "a", "b", dec!(20), 60), (2, "b", "a", dec!(20), 30)]);
        let outcome = CircularTransferHeuristic
            .scan(&scope(), &ledger, &DetectionConfig::default())
            .unwrap();

        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.subjects.len(), 2);
        assert_eq!(finding.evidence.transaction_ids(), vec![TransactionId::new(1), TransactionId::new(2)]);
    }

    #[test]
    fn test_open_chain_is_quiet() {
        let ledger = ledger(&[(1, "a", "b", dec!(10), 60), (2, "b", "c", dec!(10), 30)]);
        let outcome = CircularTransferHeuristic
            .scan(&scope(), &ledger, &DetectionConfig::default())
            .unwrap();
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_triangle_severity_scales_with_amount() {
        let config = DetectionConfig::default();
        let small = ledger(&[
            (1, "a", "b", dec!(10), 90),
            (2, "b", "c", dec!(10), 60),
            (3, "c", "a", dec!(10), 30),
        ]);
        let outcome = CircularTransferHeuristic.scan(&scope(), &small, &config).unwrap();
        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.evidence.total_amount(), Some(dec!(30)));
        assert_eq!(finding.severity(&config), Severity::Low);
        if let Evidence::CircularTransfer { path, .. } = &finding.evidence {
            assert_eq!(path, &vec![UserId::new("a"), UserId::new("b"), UserId::new("c")]);
        } else {
            panic!("wrong evidence kind");
        }

        let large = ledger(&[
            (1, "a", "b", dec!(100), 90),
            (2, "b", "c", dec!(100), 60),
            (3, "c", "a", dec!(100), 30),
        ]);
        let outcome = CircularTransferHeuristic.scan(&scope(), &large, &config).unwrap();
        assert_eq!(outcome.findings[0].severity(&config), Severity::Critical);
    }

    #[test]
    fn test_loop_outside_window_is_quiet() {
        let ledger = ledger(&[(1, "a", "b", dec!(20), 25 * 60), (2, "b", "a", dec!(20), 30)]);
        let outcome = CircularTransferHeuristic
            .scan(&scope(), &ledger, &DetectionConfig::default())
            .unwrap();
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_pending_hop_breaks_loop() {
        use crate::core::tenant::TenantId;
        use crate::core::transaction::TransactionStatus;
        use crate::heuristics::test_support::now;
        use chrono::Duration;

        let mut ledger = ledger(&[(1, "a", "b", dec!(20), 60)]);
        ledger
            .add_transaction(
                Transaction::new(
                    2,
                    TenantId::new(1),
                    UserId::new("b"),
                    UserId::new("a"),
                    dec!(20),
                    now() - Duration::minutes(30),
                )
                .with_status(TransactionStatus::Pending),
            )
            .unwrap();
        let outcome = CircularTransferHeuristic
            .scan(&scope(), &ledger, &DetectionConfig::default())
            .unwrap();
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.skipped, vec!["tx-2".to_string()]);
    }
}
