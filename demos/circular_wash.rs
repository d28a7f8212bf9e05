//! Credit washing through a loop of members.
//!
//! Builds a small community where three members push credits around a
//! triangle, runs a detection pass, then walks the resulting alert through
//! review.

use chrono::{Duration, TimeZone, Utc};
use credit_watch::alerts::{AlertStore, AlertType, LifecycleManager, MemoryAlertStore};
use credit_watch::core::config::{ConfigResolver, EngineSettings};
use credit_watch::core::tenant::{Tenant, TenantScope};
use credit_watch::core::transaction::Transaction;
use credit_watch::core::user::UserId;
use credit_watch::engine::Orchestrator;
use credit_watch::graph::scc::find_sccs;
use credit_watch::graph::transfer_graph::TransferGraph;
use credit_watch::ledger::{LedgerReader, LedgerSnapshot};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn main() {
    println!("╔═══════════════════════════════════════════════╗");
    println!("║  credit-watch: Circular Credit Washing        ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    let now = Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap();
    let tenant = Tenant::new(7, "maple-grove");
    let mut ledger = LedgerSnapshot::new();
    ledger.add_tenant(tenant.clone());

    let ana = UserId::new("ana");
    let bo = UserId::new("bo");
    let cy = UserId::new("cy");
    let dee = UserId::new("dee");
    let eli = UserId::new("eli");

    println!("Transfers:");
    println!("  ana → bo   40 credits  (09:00)");
    println!("  bo  → cy   40 credits  (09:30)");
    println!("  cy  → ana  40 credits  (10:30)");
    println!("  ana → dee   2 credits  (11:00)");
    println!("  dee → eli  75 credits  (11:30)\n");

    let start = now - Duration::hours(9);
    let transfers = [
        (1, &ana, &bo, dec!(40), 0),
        (2, &bo, &cy, dec!(40), 30),
        (3, &cy, &ana, dec!(40), 90),
        (4, &ana, &dee, dec!(2), 120),
        (5, &dee, &eli, dec!(75), 150),
    ];
    for (id, from, to, amount, minutes) in transfers {
        ledger
            .add_transaction(Transaction::new(
                id,
                tenant.id,
                from.clone(),
                to.clone(),
                amount,
                start + Duration::minutes(minutes),
            ))
            .expect("tenant registered above");
    }

    // Graph view of the detection window
    println!("━━━ Strongly Connected Components ━━━\n");
    let txs = ledger
        .query(tenant.id, now - Duration::hours(24), now)
        .expect("tenant registered above");
    let graph = TransferGraph::from_transactions(&txs);
    for (i, scc) in find_sccs(&graph).iter().enumerate() {
        let users: Vec<String> = scc.users.iter().map(|u| u.to_string()).collect();
        println!("  SCC {}: [{}] cyclic: {}", i, users.join(", "), scc.is_cyclic());
    }
    println!();

    // Detection pass
    let ledger = Arc::new(ledger);
    let store = Arc::new(MemoryAlertStore::new());
    let resolver = Arc::new(ConfigResolver::default());
    let orchestrator = Orchestrator::new(
        ledger.clone(),
        ledger.clone(),
        store.clone(),
        resolver.clone(),
        EngineSettings::default(),
    );
    let summary = orchestrator.detect(now).expect("registry is in memory");
    println!("{}", summary);

    println!("━━━ Alerts ━━━\n");
    let alerts = store.list(tenant.id).expect("store is in memory");
    for alert in &alerts {
        let subjects: Vec<String> = alert.subject_user_ids().iter().map(|u| u.to_string()).collect();
        println!(
            "  {} [{}] {}: {}",
            alert.alert_type(),
            alert.severity(),
            subjects.join(", "),
            alert.evidence().total_amount().map(|a| a.to_string()).unwrap_or_default()
        );
    }
    println!();

    // Reviewer workflow
    println!("━━━ Review ━━━\n");
    let lifecycle = LifecycleManager::new(store.clone(), resolver);
    let scope = TenantScope::new(tenant.clone(), now).expect("tenant is active");
    if let Some(circular) = alerts.iter().find(|a| a.alert_type() == AlertType::CircularTransfer) {
        let reviewing = lifecycle
            .begin_review(&scope, circular.id())
            .expect("alert is new");
        println!("  {} → {}", circular.id(), reviewing.status());
        let resolved = lifecycle
            .resolve(&scope, circular.id(), "members confirmed wash trading; credits reversed")
            .expect("alert is under review");
        println!("  {} → {}", circular.id(), resolved.status());
    }

    let rerun = orchestrator.detect(now).expect("registry is in memory");
    println!("\n  Rerun after resolution created {} new alert(s).", rerun.alerts_created());
    println!("  A resolved alert frees its key, so the same loop is raised again");
    println!("  until it leaves the detection window.");
}
