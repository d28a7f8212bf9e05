//! credit-watch CLI
//!
//! Entry points for the external scheduler and for reviewers.
//!
//! # Usage
//!
//! ```bash
//! # Scan every active tenant and record new alerts
//! credit-watch detect --ledger ledger.json --alerts alerts.json
//!
//! # Alerts raised in the last 24 hours, as JSON
//! credit-watch daily_report --ledger ledger.json --alerts alerts.json --format json
//!
//! # Age out old alerts
//! credit-watch cleanup --ledger ledger.json --alerts alerts.json --config watch.json
//!
//! # Generate a synthetic ledger
//! credit-watch generate --tenants 3 --users 25 --transactions 200 --output ledger.json
//! ```

use chrono::{DateTime, Utc};
use credit_watch::alerts::{Alert, JsonFileAlertStore, LifecycleManager};
use credit_watch::core::config::{ConfigFile, ConfigResolver};
use credit_watch::core::tenant::{TenantId, TenantScope};
use credit_watch::engine::Orchestrator;
use credit_watch::ledger::{LedgerSnapshot, TenantRegistry};
use credit_watch::simulation::{generate_snapshot, LedgerProfile};
use log::{error, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::process;
use std::sync::Arc;
use uuid::Uuid;

fn print_usage() {
    eprintln!(
        r#"credit-watch — abuse detection for multi-tenant time-credit ledgers

USAGE:
    credit-watch <COMMAND> [OPTIONS]

COMMANDS:
    detect         Run all heuristics over every active tenant
    daily_report   Alerts created in the last 24 hours, per tenant
    cleanup        Auto-dismiss stale low-severity alerts and archive old ones
    stats          Alert counts by status and type, per tenant
    review         Move one alert through the review workflow
    generate       Generate a random ledger snapshot (for testing)
    help           Show this message

OPTIONS (detect, daily_report, cleanup, stats, review):
    --ledger <FILE>     Ledger snapshot (JSON)
    --alerts <FILE>     Alert store (JSON; created if missing)
    --config <FILE>     Engine and per-tenant configuration (JSON)
    --format <FORMAT>   Output format: text (default) or json
    --now <RFC3339>     Logical run time (default: current time)

OPTIONS (review):
    --tenant <ID>       Tenant owning the alert
    --alert <UUID>      Alert id
    --action <ACTION>   review, resolve or dismiss
    --notes <TEXT>      Resolution notes (required for resolve)

OPTIONS (generate):
    --tenants <N>       Number of tenants (default: 3)
    --users <N>         Members per tenant (default: 25)
    --transactions <N>  Background transfers per tenant (default: 200)
    --cycles <N>        Planted transfer loops per tenant (default: 1)
    --seed <N>          Fixed random seed
    --now <RFC3339>     End of the generated history (default: current time)
    --output <FILE>     Write to file instead of stdout

Log verbosity follows RUST_LOG (default: info).

EXAMPLES:
    credit-watch detect --ledger ledger.json --alerts alerts.json
    credit-watch stats --ledger ledger.json --alerts alerts.json --format json
    credit-watch review --ledger ledger.json --alerts alerts.json --tenant 1 \
        --alert 6f0c...e1 --action resolve --notes "refunded""#
    );
}

/// Collect `--key value` pairs, rejecting anything not in `allowed`.
fn parse_options(args: &[String], allowed: &[&str]) -> HashMap<String, String> {
    let mut options = HashMap::new();
    let mut i = 0;
    while i < args.len() {
        let key = args[i].as_str();
        if !allowed.contains(&key) {
            eprintln!("Unknown option: {}", key);
            process::exit(1);
        }
        i += 1;
        let value = args.get(i).cloned().unwrap_or_else(|| {
            eprintln!("{} requires a value", key);
            process::exit(1);
        });
        options.insert(key.trim_start_matches("--").to_string(), value);
        i += 1;
    }
    options
}

fn required<'a>(options: &'a HashMap<String, String>, key: &str) -> &'a str {
    options.get(key).map(String::as_str).unwrap_or_else(|| {
        eprintln!("Error: --{} is required", key);
        process::exit(1);
    })
}

fn parse_number<T: std::str::FromStr>(options: &HashMap<String, String>, key: &str, default: T) -> T {
    match options.get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("--{} requires a number, got '{}'", key, raw);
            process::exit(1);
        }),
    }
}

fn parse_now(options: &HashMap<String, String>) -> DateTime<Utc> {
    match options.get("now") {
        None => Utc::now(),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                eprintln!("Invalid --now '{}': {}", raw, e);
                process::exit(1);
            }),
    }
}

fn emit<T: Serialize + Display>(value: &T, format: &str) {
    if format == "json" {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error encoding output: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", value);
    }
}

/// Everything a ledger-backed command needs, opened once at startup.
struct Runtime {
    ledger: Arc<LedgerSnapshot>,
    store: Arc<JsonFileAlertStore>,
    config: ConfigFile,
    resolver: Arc<ConfigResolver>,
    format: String,
    now: DateTime<Utc>,
}

const RUNTIME_OPTIONS: [&str; 5] = ["--ledger", "--alerts", "--config", "--format", "--now"];

impl Runtime {
    fn open(options: &HashMap<String, String>) -> Self {
        let format = options.get("format").cloned().unwrap_or_else(|| "text".to_string());
        if format != "text" && format != "json" {
            eprintln!("--format requires 'text' or 'json'");
            process::exit(1);
        }
        let config = match options.get("config") {
            Some(path) => ConfigFile::load(path).unwrap_or_else(|e| {
                eprintln!("Error loading config '{}': {}", path, e);
                process::exit(1);
            }),
            None => ConfigFile::default(),
        };
        let resolver = ConfigResolver::new(&config).unwrap_or_else(|e| {
            eprintln!("Error in config: {}", e);
            process::exit(1);
        });
        let ledger_path = required(options, "ledger");
        let ledger = LedgerSnapshot::load(ledger_path).unwrap_or_else(|e| {
            eprintln!("Error loading ledger '{}': {}", ledger_path, e);
            process::exit(1);
        });
        let alerts_path = required(options, "alerts");
        let store = JsonFileAlertStore::open(alerts_path).unwrap_or_else(|e| {
            eprintln!("Error opening alert store '{}': {}", alerts_path, e);
            process::exit(1);
        });
        info!(
            "opened ledger {} and alert store {} ({} alerts)",
            ledger_path,
            alerts_path,
            store.len()
        );
        Self {
            ledger: Arc::new(ledger),
            store: Arc::new(store),
            config,
            resolver: Arc::new(resolver),
            format,
            now: parse_now(options),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.ledger.clone(),
            self.ledger.clone(),
            self.store.clone(),
            self.resolver.clone(),
            self.config.engine.clone(),
        )
    }

    fn lifecycle(&self) -> LifecycleManager {
        LifecycleManager::new(self.store.clone(), self.resolver.clone())
    }

    fn persist(&self) {
        if let Err(e) = self.store.persist() {
            error!("could not write alert store {}: {}", self.store.path().display(), e);
            process::exit(1);
        }
    }
}

fn fatal(command: &str, err: impl Display) -> ! {
    error!("{} aborted: {}", command, err);
    process::exit(1);
}

fn cmd_detect(args: &[String]) {
    let runtime = Runtime::open(&parse_options(args, &RUNTIME_OPTIONS));
    let summary = runtime
        .orchestrator()
        .detect(runtime.now)
        .unwrap_or_else(|e| fatal("detect", e));
    runtime.persist();
    emit(&summary, &runtime.format);
}

fn cmd_daily_report(args: &[String]) {
    let runtime = Runtime::open(&parse_options(args, &RUNTIME_OPTIONS));
    let report = runtime
        .orchestrator()
        .daily_report(runtime.now)
        .unwrap_or_else(|e| fatal("daily_report", e));
    emit(&report, &runtime.format);
}

fn cmd_cleanup(args: &[String]) {
    let runtime = Runtime::open(&parse_options(args, &RUNTIME_OPTIONS));
    let summary = runtime
        .lifecycle()
        .run(runtime.ledger.as_ref(), runtime.now)
        .unwrap_or_else(|e| fatal("cleanup", e));
    runtime.persist();
    emit(&summary, &runtime.format);
}

fn cmd_stats(args: &[String]) {
    let runtime = Runtime::open(&parse_options(args, &RUNTIME_OPTIONS));
    let report = runtime
        .orchestrator()
        .stats(runtime.now)
        .unwrap_or_else(|e| fatal("stats", e));
    emit(&report, &runtime.format);
}

/// Text rendering for the `review` command.
#[derive(Serialize)]
#[serde(transparent)]
struct ReviewedAlert(Alert);

impl Display for ReviewedAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let alert = &self.0;
        writeln!(f, "Alert {}", alert.id())?;
        writeln!(f, "  type:     {}", alert.alert_type())?;
        writeln!(f, "  severity: {}", alert.severity())?;
        writeln!(f, "  status:   {}", alert.status())?;
        let subjects: Vec<String> = alert.subject_user_ids().iter().map(|u| u.to_string()).collect();
        writeln!(f, "  subjects: {}", subjects.join(", "))?;
        if let Some(notes) = alert.resolution_notes() {
            writeln!(f, "  notes:    {}", notes)?;
        }
        Ok(())
    }
}

fn cmd_review(args: &[String]) {
    let mut allowed = RUNTIME_OPTIONS.to_vec();
    allowed.extend(["--tenant", "--alert", "--action", "--notes"]);
    let options = parse_options(args, &allowed);
    let runtime = Runtime::open(&options);

    let tenant_raw = required(&options, "tenant");
    let tenant_id = tenant_raw.parse().map(TenantId::new).unwrap_or_else(|_| {
        eprintln!("--tenant requires a numeric tenant id, got '{}'", tenant_raw);
        process::exit(1);
    });
    let alert_raw = required(&options, "alert");
    let alert_id = Uuid::parse_str(alert_raw).unwrap_or_else(|e| {
        eprintln!("Invalid --alert '{}': {}", alert_raw, e);
        process::exit(1);
    });
    let notes = options.get("notes").cloned();

    let tenant = runtime
        .ledger
        .list_active_tenants()
        .unwrap_or_else(|e| fatal("review", e))
        .into_iter()
        .find(|t| t.id == tenant_id)
        .unwrap_or_else(|| {
            eprintln!("Error: tenant {} is not an active tenant", tenant_id);
            process::exit(1);
        });
    let scope = TenantScope::new(tenant, runtime.now).unwrap_or_else(|e| fatal("review", e));
    let lifecycle = runtime.lifecycle();

    let result = match required(&options, "action") {
        "review" => lifecycle.begin_review(&scope, alert_id),
        "resolve" => {
            let notes = notes.unwrap_or_else(|| {
                eprintln!("Error: --notes is required to resolve an alert");
                process::exit(1);
            });
            lifecycle.resolve(&scope, alert_id, notes)
        }
        "dismiss" => lifecycle.dismiss(&scope, alert_id, notes),
        other => {
            eprintln!("--action requires review, resolve or dismiss, got '{}'", other);
            process::exit(1);
        }
    };
    let alert = result.unwrap_or_else(|e| fatal("review", e));
    runtime.persist();
    emit(&ReviewedAlert(alert), &runtime.format);
}

fn cmd_generate(args: &[String]) {
    let options = parse_options(
        args,
        &["--tenants", "--users", "--transactions", "--cycles", "--seed", "--now", "--output"],
    );
    let defaults = LedgerProfile::default();
    let profile = LedgerProfile {
        tenant_count: parse_number(&options, "tenants", defaults.tenant_count),
        users_per_tenant: parse_number(&options, "users", defaults.users_per_tenant),
        transactions_per_tenant: parse_number(&options, "transactions", defaults.transactions_per_tenant),
        planted_cycles: parse_number(&options, "cycles", defaults.planted_cycles),
        seed: options.get("seed").map(|_| parse_number(&options, "seed", 0u64)),
        ..defaults
    };

    let snapshot = generate_snapshot(&profile, parse_now(&options));
    let json = serde_json::to_string_pretty(&snapshot).unwrap_or_else(|e| {
        eprintln!("Error encoding snapshot: {}", e);
        process::exit(1);
    });

    if let Some(path) = options.get("output") {
        fs::write(path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        let transactions: usize = snapshot.tenants.iter().map(|t| t.transactions.len()).sum();
        eprintln!(
            "Generated {} transactions across {} tenants → {}",
            transactions,
            snapshot.tenants.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "detect" => cmd_detect(rest),
        "daily_report" => cmd_daily_report(rest),
        "cleanup" => cmd_cleanup(rest),
        "stats" => cmd_stats(rest),
        "review" => cmd_review(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
