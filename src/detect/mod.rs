//! Anomaly detectors.
//!
//! Each detector is a pure function of an `AnalysisContext`: the filtered transactions, the
//! entity's schema and the configuration. Detectors share no mutable state, so the engine can run
//! them side by side and a failure in one never affects another.
//!
//! A detector that cannot say anything useful about the data does not fail. It returns
//! `Outcome::InsufficientData` or `Outcome::NotApplicable` with a reason code, which ends up in
//! the `DetectorReport` alongside the findings of the detectors that did run.

mod consolidation;
mod contract_growth;
mod duplicate;
mod spike;
mod split;

pub use consolidation::ConsolidationDetector;
pub use contract_growth::ContractGrowthDetector;
pub use duplicate::DuplicatePaymentDetector;
pub use spike::SpendingSpikeDetector;
pub use split::SplitPaymentDetector;

use crate::config::AnalysisConfig;
use crate::error::Error;
use crate::filter::Schema;
use crate::model::{Finding, Transaction};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identifies one of the detectors.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Duplicate,
    Spike,
    Split,
    Consolidation,
    ContractGrowth,
}

serde_plain::derive_display_from_serialize!(DetectorKind);
serde_plain::derive_fromstr_from_deserialize!(DetectorKind);

impl DetectorKind {
    pub const ALL: [DetectorKind; 5] = [
        DetectorKind::Duplicate,
        DetectorKind::Spike,
        DetectorKind::Split,
        DetectorKind::Consolidation,
        DetectorKind::ContractGrowth,
    ];

    /// Returns the detector implementation for this kind.
    pub fn detector(&self) -> Arc<dyn Detector> {
        match self {
            DetectorKind::Duplicate => Arc::new(DuplicatePaymentDetector),
            DetectorKind::Spike => Arc::new(SpendingSpikeDetector),
            DetectorKind::Split => Arc::new(SplitPaymentDetector),
            DetectorKind::Consolidation => Arc::new(ConsolidationDetector),
            DetectorKind::ContractGrowth => Arc::new(ContractGrowthDetector),
        }
    }
}

/// What a detector concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The detector ran. The list may be empty.
    Findings(Vec<Finding>),
    /// There was not enough data to run, e.g. too few months for a spike baseline.
    InsufficientData(String),
    /// A dimension the detector needs is absent from the entity's schema or data.
    NotApplicable(String),
}

/// How a detector run ended.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DetectorStatus {
    Completed,
    InsufficientData(String),
    NotApplicable(String),
    Failed(String),
    Cancelled,
    TimedOut,
}

impl DetectorStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, DetectorStatus::Completed)
    }
}

/// The result of one detector, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReport {
    pub detector: DetectorKind,
    #[serde(flatten)]
    pub status: DetectorStatus,
    pub findings: Vec<Finding>,
    pub elapsed_ms: u64,
}

impl DetectorReport {
    /// Builds a report from what `Detector::detect` returned.
    pub fn from_result(detector: DetectorKind, result: Result<Outcome>, elapsed_ms: u64) -> Self {
        let (status, findings) = match result {
            Ok(Outcome::Findings(findings)) => (DetectorStatus::Completed, findings),
            Ok(Outcome::InsufficientData(reason)) => {
                (DetectorStatus::InsufficientData(reason), Vec::new())
            }
            Ok(Outcome::NotApplicable(reason)) => (DetectorStatus::NotApplicable(reason), Vec::new()),
            Err(e) if e.error_type() == crate::ErrorType::Cancelled => {
                (DetectorStatus::Cancelled, Vec::new())
            }
            Err(e) => (DetectorStatus::Failed(e.to_string()), Vec::new()),
        };
        Self {
            detector,
            status,
            findings,
            elapsed_ms,
        }
    }

    /// A report for a detector that produced nothing, with the given status.
    pub fn without_findings(detector: DetectorKind, status: DetectorStatus, elapsed_ms: u64) -> Self {
        Self {
            detector,
            status,
            findings: Vec::new(),
            elapsed_ms,
        }
    }
}

/// Everything a detector may look at. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    transactions: Arc<[Transaction]>,
    schema: Arc<Schema>,
    config: Arc<AnalysisConfig>,
    cancel: CancellationToken,
}

impl AnalysisContext {
    pub fn new(
        transactions: impl Into<Arc<[Transaction]>>,
        schema: Schema,
        config: Arc<AnalysisConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transactions: transactions.into(),
            schema: Arc::new(schema),
            config,
            cancel,
        }
    }

    /// The same context with a different cancellation token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cap on transaction references per finding.
    pub(crate) fn evidence_cap(&self) -> usize {
        self.config.limits.max_evidence
    }

    /// Returns a `Cancelled` error once the caller has cancelled the analysis. Detectors call
    /// this between groups.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

/// A single anomaly detector.
///
/// `detect` runs on the blocking thread pool and must call `AnalysisContext::checkpoint`
/// periodically so that cancellation and timeouts take effect.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome>;
}
