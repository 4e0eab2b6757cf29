//! Runs the detectors over one filtered transaction set and assembles the report.
//!
//! Every detector runs on the blocking pool in its own task, with its own child cancellation
//! token and a wall-clock limit. A detector that fails, panics, times out or is cancelled gets a
//! report saying so; the others are unaffected.

use crate::cache::{CacheKey, FindingsCache};
use crate::concentration::ConcentrationProfile;
use crate::config::AnalysisConfig;
use crate::detect::{AnalysisContext, Detector, DetectorKind, DetectorReport, DetectorStatus};
use crate::filter::{FilterSpec, Schema};
use crate::model::{Finding, Transaction};
use crate::savings::SavingsSummary;
use crate::store::TransactionStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How one detector run ended, without its findings.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    pub detector: DetectorKind,
    #[serde(flatten)]
    pub status: DetectorStatus,
    pub finding_count: usize,
    pub elapsed_ms: u64,
    /// Whether the result came from the findings cache.
    pub cached: bool,
}

/// The result of analysing one filtered transaction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub filter: FilterSpec,
    pub transaction_count: usize,
    pub detectors: Vec<DetectorRun>,
    /// Most severe first, then largest monetary value.
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concentration: Option<ConcentrationProfile>,
    pub savings: SavingsSummary,
}

/// Runs a set of detectors. Build one per configuration and reuse it.
pub struct Analyzer {
    config: Arc<AnalysisConfig>,
    detectors: Vec<Arc<dyn Detector>>,
    timeout: Duration,
    cache: Option<Arc<FindingsCache>>,
}

impl Analyzer {
    /// An analyzer running every detector.
    pub fn new(config: AnalysisConfig) -> Self {
        let timeout = config.limits.detector_timeout();
        Self {
            config: Arc::new(config),
            detectors: DetectorKind::ALL.iter().map(|k| k.detector()).collect(),
            timeout,
            cache: None,
        }
    }

    /// Restricts the run to `kinds`.
    pub fn with_detectors(mut self, kinds: &[DetectorKind]) -> Self {
        self.detectors = kinds.iter().map(|k| k.detector()).collect();
        self
    }

    /// Adds a detector, replacing any existing detector of the same kind.
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.retain(|d| d.kind() != detector.kind());
        self.detectors.push(detector);
        self
    }

    /// Overrides the per-detector time limit from the configuration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reuses detector results from `cache` in `analyze_entity`.
    pub fn with_cache(mut self, cache: Arc<FindingsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyses the transactions matching `filter`.
    ///
    /// # Errors
    /// Returns an `ErrorType::Schema` error if the filter references a column that is not in
    /// `schema`. Detector problems are never errors; they are reported per detector.
    pub async fn analyze(
        &self,
        transactions: &[Transaction],
        schema: &Schema,
        filter: &FilterSpec,
        cancel: CancellationToken,
    ) -> Result<AnalysisReport> {
        let predicate = filter.compile(schema)?;
        let filtered: Vec<Transaction> = transactions
            .iter()
            .filter(|t| predicate.matches(t))
            .cloned()
            .collect();
        let ctx = AnalysisContext::new(filtered, schema.clone(), self.config.clone(), cancel);
        let runs = self.run_all(&ctx).await;
        Ok(self.report(&ctx, None, filter, runs))
    }

    /// Analyses one entity held in `store`, using the findings cache when one is configured.
    pub async fn analyze_entity(
        &self,
        store: &dyn TransactionStore,
        entity: &str,
        filter: &FilterSpec,
        cancel: CancellationToken,
    ) -> Result<AnalysisReport> {
        let schema = store.schema(entity).await?;
        let predicate = filter.compile(&schema)?;
        let transactions = store.fetch(entity, &predicate, None).await?;
        let ctx = AnalysisContext::new(transactions, schema, self.config.clone(), cancel);

        let mut runs = Vec::with_capacity(self.detectors.len());
        let mut pending = Vec::new();
        for detector in &self.detectors {
            let cached = match &self.cache {
                Some(cache) => {
                    cache
                        .get(&CacheKey::new(entity, filter, detector.kind()))
                        .await
                }
                None => None,
            };
            match cached {
                Some(report) => {
                    debug!("Using cached {} report for {entity}", report.detector);
                    runs.push((report, true));
                }
                None => pending.push(detector.clone()),
            }
        }

        let fresh = run_detectors(&ctx, pending, self.timeout).await;
        if let Some(cache) = &self.cache {
            for report in fresh.iter().filter(|r| is_cacheable(&r.status)) {
                cache
                    .insert(CacheKey::new(entity, filter, report.detector), report.clone())
                    .await;
            }
        }
        runs.extend(fresh.into_iter().map(|r| (r, false)));
        Ok(self.report(&ctx, Some(entity.to_string()), filter, runs))
    }

    async fn run_all(&self, ctx: &AnalysisContext) -> Vec<(DetectorReport, bool)> {
        run_detectors(ctx, self.detectors.clone(), self.timeout)
            .await
            .into_iter()
            .map(|r| (r, false))
            .collect()
    }

    fn report(
        &self,
        ctx: &AnalysisContext,
        entity: Option<String>,
        filter: &FilterSpec,
        mut runs: Vec<(DetectorReport, bool)>,
    ) -> AnalysisReport {
        runs.sort_by_key(|(r, _)| r.detector);
        let reports: Vec<DetectorReport> = runs.iter().map(|(r, _)| r.clone()).collect();
        let savings = SavingsSummary::estimate(&reports, &self.config.savings);

        let mut findings: Vec<Finding> = reports
            .iter()
            .filter(|r| r.status.is_completed())
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.monetary_value.cmp(&a.monetary_value))
        });

        let detectors = runs
            .into_iter()
            .map(|(r, cached)| DetectorRun {
                detector: r.detector,
                finding_count: r.findings.len(),
                status: r.status,
                elapsed_ms: r.elapsed_ms,
                cached,
            })
            .collect();

        let report = AnalysisReport {
            request_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            entity,
            filter: filter.clone(),
            transaction_count: ctx.transactions().len(),
            detectors,
            findings,
            concentration: ConcentrationProfile::analyze(ctx.transactions()),
            savings,
        };
        info!(
            "Analysis {} found {} findings in {} transactions, potential savings {}",
            report.request_id,
            report.findings.len(),
            report.transaction_count,
            report.savings.total_potential
        );
        report
    }
}

/// Failures, timeouts and cancellations are transient and are not cached.
fn is_cacheable(status: &DetectorStatus) -> bool {
    matches!(
        status,
        DetectorStatus::Completed
            | DetectorStatus::InsufficientData(_)
            | DetectorStatus::NotApplicable(_)
    )
}

/// Runs `detectors` concurrently and returns one report per detector, in input order.
pub async fn run_detectors(
    ctx: &AnalysisContext,
    detectors: Vec<Arc<dyn Detector>>,
    timeout: Duration,
) -> Vec<DetectorReport> {
    let kinds: Vec<DetectorKind> = detectors.iter().map(|d| d.kind()).collect();
    let mut set = JoinSet::new();
    for detector in detectors {
        let token = ctx.cancel_token().child_token();
        let run_ctx = ctx.with_cancel(token.clone());
        set.spawn(run_one(detector, run_ctx, token, timeout));
    }

    let mut reports = Vec::with_capacity(kinds.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Detector task failed to join: {e}"),
        }
    }
    kinds
        .into_iter()
        .map(|kind| {
            reports
                .iter()
                .position(|r| r.detector == kind)
                .map(|ix| reports.swap_remove(ix))
                .unwrap_or_else(|| {
                    DetectorReport::without_findings(
                        kind,
                        DetectorStatus::Failed("Detector task did not complete".to_string()),
                        0,
                    )
                })
        })
        .collect()
}

async fn run_one(
    detector: Arc<dyn Detector>,
    ctx: AnalysisContext,
    token: CancellationToken,
    timeout: Duration,
) -> DetectorReport {
    let kind = detector.kind();
    let started = Instant::now();
    let handle = tokio::task::spawn_blocking(move || detector.detect(&ctx));

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Err(DetectorStatus::Cancelled),
        joined = tokio::time::timeout(timeout, handle) => match joined {
            Err(_) => {
                // Let the blocking task see the cancellation at its next checkpoint.
                token.cancel();
                Err(DetectorStatus::TimedOut)
            }
            Ok(Err(join_error)) => Err(DetectorStatus::Failed(format!(
                "Detector panicked: {join_error}"
            ))),
            Ok(Ok(result)) => Ok(result),
        },
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let report = match outcome {
        Ok(result) => DetectorReport::from_result(kind, result, elapsed_ms),
        Err(status) => DetectorReport::without_findings(kind, status, elapsed_ms),
    };
    match &report.status {
        DetectorStatus::Failed(message) => warn!("{kind} detector failed: {message}"),
        DetectorStatus::TimedOut => warn!("{kind} detector timed out after {timeout:?}"),
        status => debug!("{kind} detector finished in {elapsed_ms}ms: {status:?}"),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Outcome;
    use crate::model::{FindingType, Severity};
    use crate::store::MemoryStore;
    use crate::test::{monthly, txn};
    use crate::ErrorType;

    struct Failing;

    impl Detector for Failing {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Consolidation
        }

        fn detect(&self, _ctx: &AnalysisContext) -> Result<Outcome> {
            let inner: anyhow::Result<Outcome> = Err(anyhow::anyhow!("boom"));
            Ok(inner?)
        }
    }

    struct Panicking;

    impl Detector for Panicking {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Spike
        }

        fn detect(&self, _ctx: &AnalysisContext) -> Result<Outcome> {
            panic!("detector bug")
        }
    }

    /// Spins until cancelled.
    struct Slow;

    impl Detector for Slow {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Split
        }

        fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
            for _ in 0..500 {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(Outcome::Findings(vec![]))
        }
    }

    fn sample() -> Vec<Transaction> {
        let mut txns = monthly(2024, 4, &[100, 100, 100, 100, 100, 100, 100, 700]);
        txns.push(txn("2024-05-01", "Globex", 1000));
        txns.push(txn("2024-05-03", "Globex", 1000));
        txns
    }

    #[tokio::test]
    async fn test_analyze_runs_every_detector() {
        let analyzer = Analyzer::new(AnalysisConfig::default());
        let report = analyzer
            .analyze(
                &sample(),
                &Schema::canonical(),
                &FilterSpec::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.detectors.len(), 5);
        assert_eq!(report.transaction_count, 10);
        let types: Vec<FindingType> = report.findings.iter().map(|f| f.finding_type()).collect();
        assert!(types.contains(&FindingType::Duplicate));
        assert!(report.findings.windows(2).all(|w| w[0].severity >= w[1].severity));
        let consolidation = report
            .detectors
            .iter()
            .find(|d| d.detector == DetectorKind::Consolidation)
            .unwrap();
        assert!(matches!(consolidation.status, DetectorStatus::NotApplicable(_)));
        assert!(report.savings.duplicate_savings.is_positive());
        assert!(report.concentration.is_some());
    }

    #[tokio::test]
    async fn test_filter_schema_error() {
        let analyzer = Analyzer::new(AnalysisConfig::default());
        let err = analyzer
            .analyze(
                &sample(),
                &Schema::canonical(),
                &FilterSpec::new().facet("colour", ["red"]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Schema);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let analyzer = Analyzer::new(AnalysisConfig::default())
            .with_detector(Arc::new(Failing))
            .with_detector(Arc::new(Panicking));
        let report = analyzer
            .analyze(
                &sample(),
                &Schema::canonical(),
                &FilterSpec::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let status = |kind: DetectorKind| {
            report
                .detectors
                .iter()
                .find(|d| d.detector == kind)
                .map(|d| d.status.clone())
                .unwrap()
        };
        assert!(matches!(status(DetectorKind::Consolidation), DetectorStatus::Failed(m) if m.contains("boom")));
        assert!(matches!(status(DetectorKind::Spike), DetectorStatus::Failed(_)));
        assert_eq!(status(DetectorKind::Duplicate), DetectorStatus::Completed);
        assert_eq!(report.findings[0].finding_type(), FindingType::Duplicate);
    }

    #[tokio::test]
    async fn test_timeout() {
        let analyzer = Analyzer::new(AnalysisConfig::default())
            .with_detectors(&[DetectorKind::Duplicate])
            .with_detector(Arc::new(Slow))
            .with_timeout(Duration::from_millis(50));
        let report = analyzer
            .analyze(
                &sample(),
                &Schema::canonical(),
                &FilterSpec::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.detectors.len(), 2);
        assert_eq!(report.detectors[0].status, DetectorStatus::Completed);
        assert_eq!(report.detectors[1].status, DetectorStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let report = Analyzer::new(AnalysisConfig::default())
            .analyze(&sample(), &Schema::canonical(), &FilterSpec::new(), token)
            .await
            .unwrap();
        assert!(report
            .detectors
            .iter()
            .all(|d| d.status == DetectorStatus::Cancelled));
        assert!(report.findings.is_empty());
        assert_eq!(report.savings, SavingsSummary::default());
    }

    #[tokio::test]
    async fn test_analyze_entity_uses_cache() {
        let store = MemoryStore::new();
        let _ = store.load(sample()).await;
        let cache = Arc::new(FindingsCache::new(Duration::from_secs(60)));
        let analyzer = Analyzer::new(AnalysisConfig::default()).with_cache(cache.clone());
        let filter = FilterSpec::new();

        let first = analyzer
            .analyze_entity(&store, "leeds", &filter, CancellationToken::new())
            .await
            .unwrap();
        assert!(first.detectors.iter().all(|d| !d.cached));
        assert_eq!(cache.len().await, 5);

        let second = analyzer
            .analyze_entity(&store, "leeds", &filter, CancellationToken::new())
            .await
            .unwrap();
        assert!(second.detectors.iter().all(|d| d.cached));
        assert_eq!(first.findings, second.findings);
        assert_ne!(first.request_id, second.request_id);

        cache.on_ingestion_complete("leeds").await;
        assert!(cache.is_empty().await);
        assert_eq!(second.findings[0].severity, Severity::Medium);
    }
}
