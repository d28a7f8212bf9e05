use chrono::{DateTime, Duration, TimeZone, Utc};
use credit_watch::alerts::{
    Alert, AlertStatus, AlertStore, AlertType, Evidence, JsonFileAlertStore, LifecycleManager,
    MemoryAlertStore, Severity,
};
use credit_watch::core::config::{ConfigFile, ConfigOverrides, ConfigResolver, EngineSettings};
use credit_watch::core::error::EngineError;
use credit_watch::core::tenant::{Tenant, TenantId, TenantScope};
use credit_watch::core::transaction::{Transaction, TransactionId};
use credit_watch::core::user::UserId;
use credit_watch::engine::{DetectionSummary, Orchestrator};
use credit_watch::ledger::{AccountSnapshot, LedgerReader, LedgerSnapshot, TenantRegistry};
use credit_watch::simulation::{generate_snapshot, LedgerProfile};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap()
}

/// Ledger builder for one or more tenants.
struct Scenario {
    ledger: LedgerSnapshot,
    next_id: u64,
}

impl Scenario {
    fn new(tenants: &[(u64, &str)]) -> Self {
        let mut ledger = LedgerSnapshot::new();
        for &(id, slug) in tenants {
            ledger.add_tenant(Tenant::new(id, slug));
        }
        Self { ledger, next_id: 1 }
    }

    /// Add a committed transfer `minutes_ago` before [`now`]; returns its id.
    fn transfer(&mut self, tenant: u64, from: &str, to: &str, amount: Decimal, minutes_ago: i64) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        self.ledger
            .add_transaction(Transaction::new(
                id,
                TenantId::new(tenant),
                UserId::new(from),
                UserId::new(to),
                amount,
                now() - Duration::minutes(minutes_ago),
            ))
            .unwrap();
        TransactionId::new(id)
    }

    fn account(&mut self, tenant: u64, user: &str, balance: Decimal, days_idle: i64) {
        self.ledger
            .add_account(
                TenantId::new(tenant),
                UserId::new(user),
                balance,
                Some(now() - Duration::days(days_idle)),
            )
            .unwrap();
    }
}

fn orchestrator(ledger: Arc<LedgerSnapshot>, store: Arc<dyn AlertStore>) -> Orchestrator {
    Orchestrator::new(
        ledger.clone(),
        ledger,
        store,
        Arc::new(ConfigResolver::default()),
        EngineSettings::default(),
    )
}

fn detect(scenario: Scenario, store: &Arc<MemoryAlertStore>) -> DetectionSummary {
    orchestrator(Arc::new(scenario.ledger), store.clone())
        .detect(now())
        .unwrap()
}

fn alerts_of(store: &MemoryAlertStore, tenant: u64, alert_type: AlertType) -> Vec<Alert> {
    store
        .list(TenantId::new(tenant))
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type() == alert_type)
        .collect()
}

#[test]
fn detect_twice_creates_no_new_alerts() {
    let profile = LedgerProfile {
        tenant_count: 4,
        seed: Some(11),
        ..Default::default()
    };
    let ledger = Arc::new(LedgerSnapshot::from_file(generate_snapshot(&profile, now())).unwrap());
    let store = Arc::new(MemoryAlertStore::new());

    let first = orchestrator(ledger.clone(), store.clone()).detect(now()).unwrap();
    assert!(first.alerts_created() > 0);
    assert!(first.failures.is_empty());

    let second = orchestrator(ledger, store.clone()).detect(now()).unwrap();
    assert_eq!(second.alerts_created(), 0);
    assert_eq!(second.duplicates_suppressed(), first.alerts_created());
    assert_eq!(store.len(), first.alerts_created());
}

#[test]
fn later_rerun_over_unchanged_ledger_creates_no_alerts() {
    // now() is 18:00; midnight of the run day is 1080 minutes earlier.
    let midnight = now() - Duration::minutes(1080);
    let mut scenario = Scenario::new(&[(1, "riverside"), (2, "hilltop")]);
    let older = scenario.transfer(1, "ann", "ben", dec!(80), 1080 + 60);
    let newer = scenario.transfer(1, "ann", "ben", dec!(80), 1080 - 20);
    // Thirteen sends from 23:59 to 00:11, straddling the bucket boundary.
    for i in 0..13 {
        scenario.transfer(2, "vic", &format!("r{i}"), dec!(2), 1081 - i);
    }
    let ledger = Arc::new(scenario.ledger);
    let store = Arc::new(MemoryAlertStore::new());
    let run = |at: DateTime<Utc>| orchestrator(ledger.clone(), store.clone()).detect(at).unwrap();

    let first = run(midnight + Duration::minutes(30));
    assert_eq!(first.alerts_created(), 2);

    // 23:59 has left the velocity window; twelve sends remain.
    let second = run(midnight + Duration::minutes(59) + Duration::seconds(30));
    assert_eq!(second.alerts_created(), 0);
    assert_eq!(second.tenant(TenantId::new(2)).unwrap().findings[&AlertType::HighVelocity], 1);

    // Only the 00:20 transfer is still inside the large-transfer lookback.
    let third = run(midnight + Duration::hours(23) + Duration::minutes(30));
    assert_eq!(third.alerts_created(), 0);
    assert_eq!(third.tenant(TenantId::new(1)).unwrap().findings[&AlertType::LargeTransfer], 1);

    let large = alerts_of(&store, 1, AlertType::LargeTransfer);
    assert_eq!(large.len(), 1);
    assert!(large[0].evidence().references(older));
    assert!(large[0].evidence().references(newer));
    assert_eq!(alerts_of(&store, 2, AlertType::HighVelocity).len(), 1);
}

#[test]
fn large_transfer_alert_references_transaction() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    let big = scenario.transfer(1, "ann", "ben", dec!(120), 45);
    scenario.transfer(1, "ben", "cat", dec!(3), 30);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let alerts = alerts_of(&store, 1, AlertType::LargeTransfer);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].evidence().references(big));
    assert_eq!(alerts[0].status(), AlertStatus::New);
}

#[test]
fn velocity_burst_yields_one_alert() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    for i in 0..11 {
        scenario.transfer(1, "ann", if i % 2 == 0 { "ben" } else { "cat" }, dec!(1), 5 + i * 5);
    }
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let alerts = alerts_of(&store, 1, AlertType::HighVelocity);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].evidence().transaction_ids().len(), 11);
    assert!(alerts[0].subject_user_ids().contains(&UserId::new("ann")));
}

#[test]
fn round_trip_between_two_users_is_circular() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    let out = scenario.transfer(1, "ann", "ben", dec!(5), 60);
    let back = scenario.transfer(1, "ben", "ann", dec!(5), 50);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let alerts = alerts_of(&store, 1, AlertType::CircularTransfer);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].evidence().references(out));
    assert!(alerts[0].evidence().references(back));
}

#[test]
fn hub_washing_with_two_partners_raises_two_alerts() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.transfer(1, "ann", "ben", dec!(5), 60);
    scenario.transfer(1, "ben", "ann", dec!(5), 50);
    scenario.transfer(1, "ann", "cat", dec!(5), 40);
    scenario.transfer(1, "cat", "ann", dec!(5), 30);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let mut subjects: Vec<Vec<String>> = alerts_of(&store, 1, AlertType::CircularTransfer)
        .iter()
        .map(|a| a.subject_user_ids().iter().map(|u| u.to_string()).collect())
        .collect();
    subjects.sort();
    assert_eq!(subjects, vec![vec!["ann", "ben"], vec!["ann", "cat"]]);
}

#[test]
fn open_chain_is_not_circular() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.transfer(1, "ann", "ben", dec!(5), 90);
    scenario.transfer(1, "ben", "cat", dec!(5), 60);
    scenario.transfer(1, "cat", "dan", dec!(5), 30);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    assert!(alerts_of(&store, 1, AlertType::CircularTransfer).is_empty());
}

#[test]
fn inactive_balance_boundary() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.account(1, "dormant", dec!(15), 91);
    scenario.account(1, "recent", dec!(15), 89);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let alerts = alerts_of(&store, 1, AlertType::InactiveHighBalance);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].subject_user_ids().contains(&UserId::new("dormant")));
}

#[test]
fn triangle_end_to_end() {
    let mut scenario = Scenario::new(&[(1, "riverside"), (2, "hilltop")]);
    // t = 0, +30min, +90min
    scenario.transfer(1, "a", "b", dec!(10), 120);
    scenario.transfer(1, "b", "c", dec!(10), 90);
    scenario.transfer(1, "c", "a", dec!(10), 30);
    scenario.transfer(2, "a", "b", dec!(100), 120);
    scenario.transfer(2, "b", "c", dec!(100), 90);
    scenario.transfer(2, "c", "a", dec!(100), 30);
    let store = Arc::new(MemoryAlertStore::new());
    detect(scenario, &store);

    let small = alerts_of(&store, 1, AlertType::CircularTransfer);
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].evidence().total_amount(), Some(dec!(30)));
    assert_eq!(small[0].severity(), Severity::Low);
    assert_eq!(small[0].subject_user_ids().len(), 3);
    match small[0].evidence() {
        Evidence::CircularTransfer { hops, .. } => {
            let times: Vec<_> = hops.iter().map(|h| h.created_at).collect();
            assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
        other => panic!("unexpected evidence {:?}", other),
    }

    let large = alerts_of(&store, 2, AlertType::CircularTransfer);
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].evidence().total_amount(), Some(dec!(300)));
    assert_eq!(large[0].severity(), Severity::Critical);
}

#[test]
fn cleanup_dismisses_and_archives() {
    // Detection ran 120 days before the cleanup pass.
    let raised_at = now() - Duration::days(120);
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.transfer(1, "ann", "ben", dec!(60), 120 * 24 * 60 + 30);
    scenario.account(1, "dormant", dec!(12), 300);
    let ledger = Arc::new(scenario.ledger);
    let store = Arc::new(MemoryAlertStore::new());

    orchestrator(ledger.clone(), store.clone()).detect(raised_at).unwrap();
    let lifecycle = LifecycleManager::new(store.clone(), Arc::new(ConfigResolver::default()));
    let tenant = TenantId::new(1);

    // The large transfer (ratio 1.2, low) is left alone; the dormant
    // account alert is closed by a reviewer 100 days ago.
    let dormant = alerts_of(&store, 1, AlertType::InactiveHighBalance).remove(0);
    let scope = TenantScope::new(Tenant::new(1, "riverside"), now() - Duration::days(100)).unwrap();
    lifecycle.begin_review(&scope, dormant.id()).unwrap();
    lifecycle.resolve(&scope, dormant.id(), "member confirmed").unwrap();

    let summary = lifecycle.run(ledger.as_ref(), now()).unwrap();
    assert!(summary.failures.is_empty());
    assert_eq!(summary.auto_dismissed(), 1);
    assert_eq!(summary.archived(), 1);

    assert!(store.get(tenant, dormant.id()).unwrap().is_none());
    let large = alerts_of(&store, 1, AlertType::LargeTransfer).remove(0);
    assert_eq!(large.status(), AlertStatus::Dismissed);
    assert!(large.resolution_notes().is_some_and(|n| !n.is_empty()));
}

/// Ledger whose store is unreachable for one tenant.
struct PartiallyDownLedger {
    inner: LedgerSnapshot,
    down: TenantId,
}

impl PartiallyDownLedger {
    fn check(&self, tenant: TenantId) -> Result<(), EngineError> {
        if tenant == self.down {
            Err(EngineError::TransientStore("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl LedgerReader for PartiallyDownLedger {
    fn query(&self, tenant: TenantId, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Transaction>, EngineError> {
        self.check(tenant)?;
        self.inner.query(tenant, since, until)
    }

    fn balance_and_last_activity(&self, tenant: TenantId, user: &UserId) -> Result<AccountSnapshot, EngineError> {
        self.check(tenant)?;
        self.inner.balance_and_last_activity(tenant, user)
    }

    fn list_users(&self, tenant: TenantId) -> Result<Vec<UserId>, EngineError> {
        self.check(tenant)?;
        self.inner.list_users(tenant)
    }
}

impl TenantRegistry for PartiallyDownLedger {
    fn list_active_tenants(&self) -> Result<Vec<Tenant>, EngineError> {
        self.inner.list_active_tenants()
    }
}

#[test]
fn one_failing_tenant_does_not_stop_the_batch() {
    let mut scenario = Scenario::new(&[(1, "riverside"), (2, "hilltop"), (3, "harbor")]);
    for tenant in 1..=3 {
        scenario.transfer(tenant, "ann", "ben", dec!(75), 20);
    }
    let ledger = Arc::new(PartiallyDownLedger {
        inner: scenario.ledger,
        down: TenantId::new(2),
    });
    let store = Arc::new(MemoryAlertStore::new());
    let summary = Orchestrator::new(
        ledger.clone(),
        ledger,
        store.clone(),
        Arc::new(ConfigResolver::default()),
        EngineSettings::default(),
    )
    .detect(now())
    .unwrap();

    assert_eq!(summary.tenants.len(), 2);
    assert_eq!(summary.alerts_created(), 2);
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.tenant_id, TenantId::new(2));
    assert_eq!(failure.kind, "transient_store");
    assert!(failure.retry_next_run);
    assert!(summary.to_string().contains("hilltop#2"));
}

#[test]
fn expired_deadline_marks_tenant_timed_out() {
    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.transfer(1, "ann", "ben", dec!(75), 20);
    let ledger = Arc::new(scenario.ledger);
    let store = Arc::new(MemoryAlertStore::new());
    let settings = EngineSettings {
        tenant_timeout_secs: 0,
        ..Default::default()
    };
    let summary = Orchestrator::new(
        ledger.clone(),
        ledger,
        store.clone(),
        Arc::new(ConfigResolver::default()),
        settings,
    )
    .detect(now())
    .unwrap();

    assert!(summary.failures.is_empty());
    let report = summary.tenant(TenantId::new(1)).unwrap();
    assert!(report.timed_out);
}

#[test]
fn tenant_override_changes_threshold() {
    let mut scenario = Scenario::new(&[(1, "riverside"), (2, "hilltop")]);
    scenario.transfer(1, "ann", "ben", dec!(80), 20);
    scenario.transfer(2, "ann", "ben", dec!(80), 20);
    let ledger = Arc::new(scenario.ledger);

    let mut config = ConfigFile::default();
    config.tenants.insert(
        TenantId::new(2),
        ConfigOverrides {
            large_transfer_threshold: Some(dec!(200)),
            ..Default::default()
        },
    );
    // An invalid override is ignored and the tenant keeps the defaults.
    config.tenants.insert(
        TenantId::new(1),
        ConfigOverrides {
            large_transfer_threshold: Some(dec!(-1)),
            ..Default::default()
        },
    );
    let store = Arc::new(MemoryAlertStore::new());
    Orchestrator::new(
        ledger.clone(),
        ledger,
        store.clone(),
        Arc::new(ConfigResolver::new(&config).unwrap()),
        config.engine.clone(),
    )
    .detect(now())
    .unwrap();

    assert_eq!(alerts_of(&store, 1, AlertType::LargeTransfer).len(), 1);
    assert!(alerts_of(&store, 2, AlertType::LargeTransfer).is_empty());
}

#[test]
fn overlapping_runs_share_one_alert_per_key() {
    let profile = LedgerProfile {
        tenant_count: 6,
        seed: Some(5),
        ..Default::default()
    };
    let ledger = Arc::new(LedgerSnapshot::from_file(generate_snapshot(&profile, now())).unwrap());

    let reference = Arc::new(MemoryAlertStore::new());
    let expected = orchestrator(ledger.clone(), reference).detect(now()).unwrap().alerts_created();

    let store = Arc::new(MemoryAlertStore::new());
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let ledger = ledger.clone();
            let store = store.clone();
            std::thread::spawn(move || orchestrator(ledger, store).detect(now()).unwrap())
        })
        .collect();
    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap().alerts_created())
        .sum();

    assert_eq!(created, expected);
    assert_eq!(store.len(), expected);
}

#[test]
fn json_store_survives_restart() {
    let dir = std::env::temp_dir().join(format!("credit-watch-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("alerts.json");

    let mut scenario = Scenario::new(&[(1, "riverside")]);
    scenario.transfer(1, "ann", "ben", dec!(5), 60);
    scenario.transfer(1, "ben", "ann", dec!(5), 50);
    let ledger = Arc::new(scenario.ledger);

    let store = Arc::new(JsonFileAlertStore::open(&path).unwrap());
    let first = orchestrator(ledger.clone(), store.clone()).detect(now()).unwrap();
    store.persist().unwrap();
    assert_eq!(first.alerts_created(), 1);

    let reopened = Arc::new(JsonFileAlertStore::open(&path).unwrap());
    assert_eq!(reopened.len(), 1);
    let second = orchestrator(ledger, reopened).detect(now()).unwrap();
    assert_eq!(second.alerts_created(), 0);

    std::fs::remove_dir_all(&dir).unwrap();
}
