//! Configuration file handling.
//!
//! Every threshold and heuristic rate the detectors use lives here under a name, so that they can
//! be recalibrated by editing a JSON file instead of the code. A missing file means defaults; a
//! partial file fills the gaps with defaults.
//!
//! Example configuration:
//! ```json
//! {
//!   "app_name": "spend-audit",
//!   "config_version": 1,
//!   "duplicate": { "window_days": 7, "materiality_floor": "500" },
//!   "spike": { "z_threshold": 1.5 },
//!   "consolidation": { "savings_rate": "0.08" },
//!   "contract_growth": { "growth_threshold_pct": 15.0, "savings_rate": "0.05" }
//! }
//! ```

use crate::error::{ErrorType, IntoResult};
use crate::Result;
use anyhow::{bail, ensure, Context};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "spend-audit";
const CONFIG_VERSION: u8 = 1;

/// All tunable values for an analysis run.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Application name, should always be "spend-audit"
    app_name: String,
    /// Configuration file version
    config_version: u8,
    pub duplicate: DuplicateConfig,
    pub spike: SpikeConfig,
    pub split: SplitConfig,
    pub consolidation: ConsolidationConfig,
    pub contract_growth: ContractGrowthConfig,
    pub cross_entity: CrossEntityConfig,
    pub savings: SavingsRates,
    pub limits: Limits,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            duplicate: DuplicateConfig::default(),
            spike: SpikeConfig::default(),
            split: SplitConfig::default(),
            consolidation: ConsolidationConfig::default(),
            contract_growth: ContractGrowthConfig::default(),
            cross_entity: CrossEntityConfig::default(),
            savings: SavingsRates::default(),
            limits: Limits::default(),
        }
    }
}

/// Duplicate-payment detection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Maximum days between two payments of the same amount to the same supplier.
    pub window_days: i64,
    /// Payments below this amount are not considered.
    pub materiality_floor: Decimal,
    /// A high-confidence group with at least this much overpayment is critical.
    pub critical_overpayment: Decimal,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            materiality_floor: Decimal::from(500),
            critical_overpayment: Decimal::from(10_000),
        }
    }
}

/// Monthly spending spikes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SpikeConfig {
    /// Months whose z-score exceeds this are flagged.
    pub z_threshold: f64,
    /// Fewer months than this is reported as insufficient data.
    pub min_months: usize,
}

impl Eq for SpikeConfig {}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            z_threshold: 1.5,
            min_months: 3,
        }
    }
}

/// Split payments structured to stay below an approval limit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SplitConfig {
    /// Approval limits to test, ascending.
    pub thresholds: Vec<Decimal>,
    /// Minimum number of payments in a week below one limit.
    pub min_payments: usize,
    /// A payment counts towards a limit when it is strictly above this fraction of it.
    pub lower_fraction: Decimal,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            thresholds: [500, 1_000, 5_000, 10_000, 25_000, 50_000, 100_000]
                .into_iter()
                .map(Decimal::from)
                .collect(),
            min_payments: 3,
            lower_fraction: Decimal::new(5, 1),
        }
    }
}

/// Categories served by many suppliers.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub min_suppliers: usize,
    /// Fraction of category spend assumed recoverable by consolidating suppliers.
    pub savings_rate: Decimal,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_suppliers: 5,
            savings_rate: Decimal::new(8, 2),
        }
    }
}

/// Year-over-year supplier spend growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ContractGrowthConfig {
    /// Growth above this percentage is flagged.
    pub growth_threshold_pct: f64,
    /// Current-year spend must exceed this.
    pub spend_floor: Decimal,
    /// Fraction of current-year spend assumed recoverable by renegotiating.
    pub savings_rate: Decimal,
}

impl Eq for ContractGrowthConfig {}

impl Default for ContractGrowthConfig {
    fn default() -> Self {
        Self {
            growth_threshold_pct: 15.0,
            spend_floor: Decimal::from(50_000),
            savings_rate: Decimal::new(5, 2),
        }
    }
}

/// Cross-council comparison.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CrossEntityConfig {
    /// Suppliers with combined spend at or below this are left out of the disparity ranking.
    pub min_combined_spend: Decimal,
    /// Length cap for each ranking.
    pub top_n: usize,
}

impl Default for CrossEntityConfig {
    fn default() -> Self {
        Self {
            min_combined_spend: Decimal::from(10_000),
            top_n: 50,
        }
    }
}

/// Rates used by the savings estimator that are not already applied by a detector.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SavingsRates {
    /// Fraction of a duplicate group's potential overpayment expected to be recovered.
    pub duplicate_recovery_rate: Decimal,
    /// Cost of processing one payment, saved for every payment a split could have avoided.
    pub processing_cost_per_transaction: Decimal,
}

impl Default for SavingsRates {
    fn default() -> Self {
        Self {
            duplicate_recovery_rate: Decimal::ONE,
            processing_cost_per_transaction: Decimal::from(25),
        }
    }
}

/// Resource bounds for one analysis request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Limits {
    /// Maximum transaction references attached to a single finding.
    pub max_evidence: usize,
    /// Wall-clock budget for each detector.
    pub detector_timeout_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_evidence: 50,
            detector_timeout_secs: 30,
        }
    }
}

impl Limits {
    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }
}

impl AnalysisConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    /// Returns an `ErrorType::Config` error if the file cannot be read or parsed, if `app_name`
    /// is wrong or if a value is out of range.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_inner(path.as_ref()).await.pub_result(ErrorType::Config)
    }

    /// Loads from `path` when given, otherwise returns the defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p).await,
            None => Ok(Self::default()),
        }
    }

    /// Saves the configuration to `path` as pretty JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)
            .context("Unable to serialize config")
            .pub_result(ErrorType::Config)?;
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Unable to write config file {}", path.display()))
            .pub_result(ErrorType::Io)
    }

    /// The JSON schema of the configuration file, for editors and validators.
    pub fn file_schema() -> serde_json::Value {
        schemars::schema_for!(AnalysisConfig).as_value().clone()
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        validate_inner(self).pub_result(ErrorType::Config)
    }
}

async fn load_inner(path: &Path) -> anyhow::Result<AnalysisConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: AnalysisConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    ensure!(
        config.app_name == APP_NAME,
        "Invalid app_name in config file: expected '{}', got '{}'",
        APP_NAME,
        config.app_name
    );
    validate_inner(&config)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

fn validate_inner(config: &AnalysisConfig) -> anyhow::Result<()> {
    ensure!(
        config.config_version <= CONFIG_VERSION,
        "Unsupported config_version {}",
        config.config_version
    );
    ensure!(
        config.duplicate.window_days >= 0,
        "duplicate.window_days must not be negative"
    );
    ensure!(
        config.spike.z_threshold.is_finite() && config.spike.z_threshold > 0.0,
        "spike.z_threshold must be a positive number"
    );
    ensure!(
        config.spike.min_months >= 2,
        "spike.min_months must be at least 2"
    );

    let ladder = &config.split.thresholds;
    if ladder.is_empty() {
        bail!("split.thresholds must not be empty");
    }
    ensure!(
        ladder.windows(2).all(|w| w[0] < w[1]) && ladder[0] > Decimal::ZERO,
        "split.thresholds must be positive and strictly ascending"
    );
    ensure!(
        config.split.lower_fraction > Decimal::ZERO && config.split.lower_fraction < Decimal::ONE,
        "split.lower_fraction must be between 0 and 1"
    );

    for (name, rate) in [
        ("consolidation.savings_rate", config.consolidation.savings_rate),
        ("contract_growth.savings_rate", config.contract_growth.savings_rate),
        ("savings.duplicate_recovery_rate", config.savings.duplicate_recovery_rate),
    ] {
        ensure!(
            rate >= Decimal::ZERO && rate <= Decimal::ONE,
            "{name} must be between 0 and 1, got {rate}"
        );
    }
    ensure!(
        config.contract_growth.growth_threshold_pct.is_finite(),
        "contract_growth.growth_threshold_pct must be a number"
    );
    ensure!(
        config.limits.detector_timeout_secs > 0,
        "limits.detector_timeout_secs must be positive"
    );
    Ok(())
}
