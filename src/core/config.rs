//! Per-tenant detection configuration.
//!
//! Thresholds and windows are never hardcoded in the heuristics. They are
//! resolved once per tenant per run into a [`DetectionConfig`] value using
//! this fallback chain:
//!
//! 1. the tenant's own overrides (`tenants.<id>` in the config file),
//! 2. the file-level `defaults`,
//! 3. the built-in defaults of [`DetectionConfig::default`].
//!
//! A tenant override that fails validation is logged and skipped, so the
//! tenant runs with the level below it instead of failing.

use crate::core::error::EngineError;
use crate::core::tenant::TenantId;
use chrono::Duration;
use log::warn;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Ratio cut-offs used to turn a heuristic's excess measure into a severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub medium: Decimal,
    pub high: Decimal,
    pub critical: Decimal,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            medium: dec!(2),
            high: dec!(3),
            critical: dec!(5),
        }
    }
}

/// Longest window or age any setting may span.
const MAX_SPAN_DAYS: i64 = 36_500;

/// Longest engine timeout or lease, in seconds.
const MAX_ENGINE_SECS: u64 = 365 * 24 * 60 * 60;

/// Resolved thresholds and windows for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub large_transfer_threshold: Decimal,
    pub large_transfer_lookback_hours: i64,
    pub velocity_window_minutes: i64,
    pub velocity_threshold: usize,
    pub cycle_window_hours: i64,
    pub cycle_max_depth: usize,
    /// Cumulative amount that counts as one unit of circular-transfer severity.
    pub cycle_reference_amount: Decimal,
    pub inactive_balance_threshold: Decimal,
    pub inactivity_days: i64,
    pub auto_dismiss_days: i64,
    pub archive_retention_days: i64,
    pub dedup_bucket_hours: i64,
    pub severity_bands: SeverityBands,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            large_transfer_threshold: dec!(50),
            large_transfer_lookback_hours: 24,
            velocity_window_minutes: 60,
            velocity_threshold: 10,
            cycle_window_hours: 24,
            cycle_max_depth: 6,
            cycle_reference_amount: dec!(50),
            inactive_balance_threshold: dec!(10),
            inactivity_days: 90,
            auto_dismiss_days: 30,
            archive_retention_days: 90,
            dedup_bucket_hours: 24,
            severity_bands: SeverityBands::default(),
        }
    }
}

impl DetectionConfig {
    pub fn large_transfer_lookback(&self) -> Duration {
        Duration::hours(self.large_transfer_lookback_hours)
    }

    pub fn velocity_window(&self) -> Duration {
        Duration::minutes(self.velocity_window_minutes)
    }

    pub fn cycle_window(&self) -> Duration {
        Duration::hours(self.cycle_window_hours)
    }

    pub fn inactivity_window(&self) -> Duration {
        Duration::days(self.inactivity_days)
    }

    pub fn auto_dismiss_age(&self) -> Duration {
        Duration::days(self.auto_dismiss_days)
    }

    pub fn archive_retention(&self) -> Duration {
        Duration::days(self.archive_retention_days)
    }

    pub fn dedup_bucket(&self) -> Duration {
        Duration::hours(self.dedup_bucket_hours)
    }

    /// Reject values no heuristic can run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive_amounts = [
            ("large_transfer_threshold", self.large_transfer_threshold),
            ("cycle_reference_amount", self.cycle_reference_amount),
            ("inactive_balance_threshold", self.inactive_balance_threshold),
        ];
        for (name, value) in positive_amounts {
            if value <= Decimal::ZERO {
                return Err(EngineError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let spans = [
            ("large_transfer_lookback_hours", self.large_transfer_lookback_hours, MAX_SPAN_DAYS * 24),
            ("velocity_window_minutes", self.velocity_window_minutes, MAX_SPAN_DAYS * 24 * 60),
            ("cycle_window_hours", self.cycle_window_hours, MAX_SPAN_DAYS * 24),
            ("inactivity_days", self.inactivity_days, MAX_SPAN_DAYS),
            ("auto_dismiss_days", self.auto_dismiss_days, MAX_SPAN_DAYS),
            ("archive_retention_days", self.archive_retention_days, MAX_SPAN_DAYS),
            ("dedup_bucket_hours", self.dedup_bucket_hours, MAX_SPAN_DAYS * 24),
        ];
        for (name, value, max) in spans {
            if value <= 0 || value > max {
                return Err(EngineError::Config(format!(
                    "{name} must be between 1 and {max}, got {value}"
                )));
            }
        }
        if self.velocity_threshold == 0 {
            return Err(EngineError::Config("velocity_threshold must be at least 1".into()));
        }
        if self.cycle_max_depth < 2 {
            return Err(EngineError::Config(format!(
                "cycle_max_depth must be at least 2, got {}",
                self.cycle_max_depth
            )));
        }
        let bands = &self.severity_bands;
        if !(bands.medium > Decimal::ZERO
            && bands.medium <= bands.high
            && bands.high <= bands.critical)
        {
            return Err(EngineError::Config(
                "severity_bands must satisfy 0 < medium <= high <= critical".into(),
            ));
        }
        Ok(())
    }

    /// Layer `overrides` on top of this config.
    pub fn apply(&self, overrides: &ConfigOverrides) -> DetectionConfig {
        let mut out = self.clone();
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = &overrides.$field { out.$field = v.clone(); })*
            };
        }
        take!(
            large_transfer_threshold,
            large_transfer_lookback_hours,
            velocity_window_minutes,
            velocity_threshold,
            cycle_window_hours,
            cycle_max_depth,
            cycle_reference_amount,
            inactive_balance_threshold,
            inactivity_days,
            auto_dismiss_days,
            archive_retention_days,
            dedup_bucket_hours,
            severity_bands,
        );
        out
    }
}

/// Partial configuration; unset fields fall through to the next level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub large_transfer_threshold: Option<Decimal>,
    pub large_transfer_lookback_hours: Option<i64>,
    pub velocity_window_minutes: Option<i64>,
    pub velocity_threshold: Option<usize>,
    pub cycle_window_hours: Option<i64>,
    pub cycle_max_depth: Option<usize>,
    pub cycle_reference_amount: Option<Decimal>,
    pub inactive_balance_threshold: Option<Decimal>,
    pub inactivity_days: Option<i64>,
    pub auto_dismiss_days: Option<i64>,
    pub archive_retention_days: Option<i64>,
    pub dedup_bucket_hours: Option<i64>,
    pub severity_bands: Option<SeverityBands>,
}

/// Process-wide settings for the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Size of the tenant worker pool.
    pub workers: usize,
    /// Wall-clock budget for one tenant's detection pass.
    pub tenant_timeout_secs: u64,
    /// How long a tenant lease stays valid if its holder never releases it.
    pub lease_ttl_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            tenant_timeout_secs: 300,
            lease_ttl_secs: 900,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        let spans = [
            ("tenant_timeout_secs", self.tenant_timeout_secs),
            ("lease_ttl_secs", self.lease_ttl_secs),
        ];
        for (name, value) in spans {
            if value > MAX_ENGINE_SECS {
                return Err(EngineError::Config(format!(
                    "{name} must be at most {MAX_ENGINE_SECS}, got {value}"
                )));
            }
        }
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tenant_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tenant_timeout_secs)
    }

    pub fn lease_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lease_ttl_secs)
    }
}

/// On-disk configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineSettings,
    pub defaults: ConfigOverrides,
    pub tenants: BTreeMap<TenantId, ConfigOverrides>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Resolves the effective [`DetectionConfig`] for each tenant.
///
/// # Examples
///
/// ```
/// use credit_watch::core::config::{ConfigFile, ConfigOverrides, ConfigResolver};
/// use credit_watch::core::tenant::TenantId;
/// use rust_decimal_macros::dec;
///
/// let mut file = ConfigFile::default();
/// file.tenants.insert(
///     TenantId::new(2),
///     ConfigOverrides { large_transfer_threshold: Some(dec!(200)), ..Default::default() },
/// );
/// let resolver = ConfigResolver::new(&file).unwrap();
/// assert_eq!(resolver.resolve(TenantId::new(1)).large_transfer_threshold, dec!(50));
/// assert_eq!(resolver.resolve(TenantId::new(2)).large_transfer_threshold, dec!(200));
/// ```
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    base: DetectionConfig,
    tenants: BTreeMap<TenantId, ConfigOverrides>,
}

impl ConfigResolver {
    /// Fails if the engine settings or the file-level defaults are invalid.
    pub fn new(file: &ConfigFile) -> Result<Self, EngineError> {
        file.engine.validate()?;
        let base = DetectionConfig::default().apply(&file.defaults);
        base.validate()?;
        Ok(Self {
            base,
            tenants: file.tenants.clone(),
        })
    }

    pub fn resolve(&self, tenant: TenantId) -> DetectionConfig {
        let Some(overrides) = self.tenants.get(&tenant) else {
            return self.base.clone();
        };
        let candidate = self.base.apply(overrides);
        match candidate.validate() {
            Ok(()) => candidate,
            Err(e) => {
                warn!("tenant {}: ignoring invalid config override ({})", tenant, e);
                self.base.clone()
            }
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self {
            base: DetectionConfig::default(),
            tenants: BTreeMap::new(),
        }
    }
}
