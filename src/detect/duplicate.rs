use super::{AnalysisContext, Detector, DetectorKind, Outcome};
use crate::aggregate::group::{self, Groups};
use crate::calendar;
use crate::model::{Amount, Confidence, Evidence, Finding, FindingDetails, Severity, Transaction};
use crate::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::debug;

/// Flags payments of the same amount to the same supplier made within a few days of each other.
///
/// Transactions are partitioned by (supplier key, amount) and sorted by date. Consecutive pairs no
/// more than `window_days` apart are linked, and each chain of linked pairs becomes one group.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicatePaymentDetector;

impl Detector for DuplicatePaymentDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Duplicate
    }

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
        let config = &ctx.config().duplicate;
        let window = Duration::days(config.window_days);
        let floor = Amount::new(config.materiality_floor);

        let material = ctx
            .transactions()
            .iter()
            .filter(|t| t.amount() >= floor && t.amount().is_positive());
        let groups = Groups::by(material, |t| (t.supplier_key(), t.amount())).sorted_by_date();

        let mut findings = Vec::new();
        for (_, members) in groups.iter() {
            ctx.checkpoint()?;
            for run in group::linked_runs(members, |a, b| b.date() - a.date() <= window) {
                findings.push(duplicate_finding(ctx, &run, config.critical_overpayment));
            }
        }
        debug!(
            "Duplicate detector found {} groups across {} partitions",
            findings.len(),
            groups.len()
        );
        Ok(Outcome::Findings(findings))
    }
}

/// The confidence that two linked payments are the same invoice paid twice.
fn pair_confidence(a: &Transaction, b: &Transaction) -> Confidence {
    match (a.reference(), b.reference()) {
        (Some(x), Some(y)) if x == y => Confidence::High,
        (Some(_), Some(_)) if calendar::iso_week(a.date()) == calendar::iso_week(b.date()) => {
            Confidence::Medium
        }
        _ => Confidence::Low,
    }
}

fn duplicate_finding(ctx: &AnalysisContext, run: &[&Transaction], critical: Decimal) -> Finding {
    let first = run[0];
    let last = run[run.len() - 1];
    let amount = first.amount();
    let occurrence_count = run.len();
    let overpayment = amount.scale(Decimal::from(occurrence_count - 1));

    let confidence = run
        .windows(2)
        .map(|pair| pair_confidence(pair[0], pair[1]))
        .max()
        .unwrap_or(Confidence::Low);

    let severity = match confidence {
        Confidence::High if overpayment.value() >= critical => Severity::Critical,
        Confidence::High => Severity::High,
        Confidence::Medium => Severity::Medium,
        Confidence::Low => Severity::Low,
    };

    let narrative = format!(
        "{} was paid {} {} times between {} and {}, a potential overpayment of {} ({} confidence)",
        first.supplier(),
        amount,
        occurrence_count,
        first.date(),
        last.date(),
        overpayment,
        confidence
    );

    Finding {
        severity,
        monetary_value: overpayment,
        evidence: Evidence::from_transactions(run.iter().copied(), ctx.evidence_cap())
            .fact("confidence", confidence),
        narrative,
        details: FindingDetails::Duplicate {
            supplier: first.supplier().to_string(),
            amount,
            occurrence_count,
            potential_overpayment: overpayment,
            confidence,
            first_date: first.date(),
            last_date: last.date(),
        },
    }
}
