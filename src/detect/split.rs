use super::{AnalysisContext, Detector, DetectorKind, Outcome};
use crate::aggregate::group::{self, Groups};
use crate::calendar;
use crate::config::SplitConfig;
use crate::model::{Amount, Evidence, Finding, FindingDetails, Severity, Transaction};
use crate::Result;
use rust_decimal::Decimal;
use tracing::{debug, trace};

/// Flags weeks in which a supplier received several payments just under an approval limit that
/// together exceed it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitPaymentDetector;

impl Detector for SplitPaymentDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Split
    }

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
        let config = &ctx.config().split;
        let groups = Groups::by(ctx.transactions(), |t| {
            (t.supplier_key(), calendar::iso_week(t.date()))
        })
        .sorted_by_date();

        let mut findings = Vec::new();
        for ((_, (iso_year, iso_week)), members) in groups.iter() {
            ctx.checkpoint()?;
            if members.len() < config.min_payments {
                continue;
            }
            if let Some((threshold, qualifying)) = first_breached_threshold(config, members) {
                trace!(
                    "Split at {} for {} in {}-W{:02}",
                    threshold,
                    members[0].supplier(),
                    iso_year,
                    iso_week
                );
                findings.push(split_finding(
                    ctx,
                    threshold,
                    (*iso_year, *iso_week),
                    &qualifying,
                ));
            }
        }
        debug!("Split detector flagged {} supplier weeks", findings.len());
        Ok(Outcome::Findings(findings))
    }
}

/// Walks the ladder in ascending order and returns the first limit that the week's payments
/// appear to have been split around, with the payments that fall just under it.
fn first_breached_threshold<'a>(
    config: &SplitConfig,
    members: &[&'a Transaction],
) -> Option<(Amount, Vec<&'a Transaction>)> {
    config.thresholds.iter().find_map(|limit| {
        let threshold = Amount::new(*limit);
        let lower = Amount::new(*limit * config.lower_fraction);
        let qualifying: Vec<&Transaction> = members
            .iter()
            .copied()
            .filter(|t| t.amount() > lower && t.amount() < threshold)
            .collect();
        let breached = qualifying.len() >= config.min_payments && group::total(&qualifying) > threshold;
        breached.then_some((threshold, qualifying))
    })
}

fn split_finding(
    ctx: &AnalysisContext,
    threshold: Amount,
    (iso_year, iso_week): (i32, u32),
    qualifying: &[&Transaction],
) -> Finding {
    let total = group::total(qualifying);
    let supplier = qualifying[0].supplier().to_string();
    let severity = if threshold.value() >= Decimal::from(25_000) {
        Severity::High
    } else if threshold.value() >= Decimal::from(5_000) {
        Severity::Medium
    } else {
        Severity::Low
    };
    Finding {
        severity,
        monetary_value: total,
        evidence: Evidence::from_transactions(qualifying.iter().copied(), ctx.evidence_cap())
            .fact("threshold", threshold)
            .fact("week", format!("{iso_year}-W{iso_week:02}")),
        narrative: format!(
            "{} payments to {} in week {}-W{:02} were each under {} but total {}",
            qualifying.len(),
            supplier,
            iso_year,
            iso_week,
            threshold,
            total
        ),
        details: FindingDetails::Split {
            supplier,
            iso_year,
            iso_week,
            threshold,
            payment_count: qualifying.len(),
            total,
        },
    }
}
