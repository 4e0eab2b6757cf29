use crate::args::AnalyzeArgs;
use crate::commands::{load, Out};
use crate::config::AnalysisConfig;
use crate::engine::{AnalysisReport, Analyzer};
use crate::filter::Schema;
use crate::store::MemoryStore;
use crate::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the detectors over the input file and reports findings and potential savings.
///
/// With an entity, only that council's transactions are analysed and its schema is inferred from
/// its own rows. Without one, the whole file is analysed as a single set.
///
/// Ctrl-C cancels the analysis; detectors that have not finished are reported as cancelled.
///
/// # Errors
/// - Returns an error if the input cannot be read or parsed.
/// - Returns an `ErrorType::Schema` error if the filter references an unavailable column.
pub async fn analyze(config: AnalysisConfig, args: &AnalyzeArgs) -> Result<Out<AnalysisReport>> {
    let transactions = load(args.input()).await?;
    let filter = args.filter().to_filter()?;

    let mut analyzer = Analyzer::new(config);
    if !args.detectors().is_empty() {
        analyzer = analyzer.with_detectors(args.detectors());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the analysis");
            on_interrupt.cancel();
        }
    });

    let report = match args.entity() {
        Some(entity) => {
            let store = MemoryStore::new();
            let _ = store.load(transactions).await;
            analyzer
                .analyze_entity(&store, entity, &filter, cancel)
                .await
        }
        None => {
            let schema = Schema::infer(&transactions);
            analyzer
                .analyze(&transactions, &schema, &filter, cancel)
                .await
        }
    };
    interrupt.abort();
    let report = report?;

    let message = format!(
        "Found {} findings in {} transactions, total potential savings {}",
        report.findings.len(),
        report.transaction_count,
        report.savings.total_potential
    );
    info!("{} of {} detectors completed", completed(&report), report.detectors.len());
    Ok(Out::new(message, report))
}

fn completed(report: &AnalysisReport) -> usize {
    report
        .detectors
        .iter()
        .filter(|d| d.status.is_completed())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{FilterArgs, InputArgs};
    use crate::detect::DetectorStatus;
    use tempfile::TempDir;

    const CSV: &str = "\
date,supplier,amount,council_id,category,reference
2024-05-01,Acme Ltd,1000,leeds,IT,INV-1
2024-05-03,ACME LIMITED,1000,leeds,IT,INV-1
2024-05-10,Globex,250,leeds,Facilities,
2024-06-10,Globex,300,york,Facilities,
";

    #[tokio::test]
    async fn test_analyze_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spend.csv");
        tokio::fs::write(&path, CSV).await.unwrap();
        let args = AnalyzeArgs::new(InputArgs::new(&path), FilterArgs::default());

        let out = analyze(AnalysisConfig::default(), &args).await.unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.transaction_count, 4);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].monetary_value.to_string(), "£1,000.00");
        let spike = report
            .detectors
            .iter()
            .find(|d| d.detector == crate::detect::DetectorKind::Spike)
            .unwrap();
        assert_eq!(
            spike.status,
            DetectorStatus::InsufficientData("fewer_than_three_months".to_string())
        );
        assert!(out.message().contains("1 findings"));
    }
}
