use super::{AnalysisContext, Detector, DetectorKind, Outcome};
use crate::aggregate::{aggregate, TimePeriod};
use crate::model::{Amount, Evidence, Finding, FindingDetails, Severity};
use crate::Result;
use rust_decimal::Decimal;
use tracing::debug;

pub(crate) const FEWER_THAN_THREE_MONTHS: &str = "fewer_than_three_months";

/// Flags months whose total spend is unusually far above the average month.
///
/// Uses the population mean and standard deviation of the monthly totals. When every month has
/// the same total the deviation is zero and nothing is flagged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpendingSpikeDetector;

impl Detector for SpendingSpikeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Spike
    }

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
        let config = &ctx.config().spike;
        let months = aggregate(ctx.transactions(), TimePeriod::Monthly, None);
        if months.len() < config.min_months {
            debug!(
                "Spike detector needs {} months, found {}",
                config.min_months,
                months.len()
            );
            return Ok(Outcome::InsufficientData(FEWER_THAN_THREE_MONTHS.to_string()));
        }
        ctx.checkpoint()?;

        let totals: Vec<f64> = months.iter().map(|m| m.total.to_f64()).collect();
        let n = totals.len() as f64;
        let mean = totals.iter().sum::<f64>() / n;
        let variance = totals.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return Ok(Outcome::Findings(Vec::new()));
        }

        let mean_amount = Amount::new(Decimal::try_from(mean).unwrap_or_default().round_dp(2));
        let findings: Vec<Finding> = months
            .iter()
            .zip(&totals)
            .filter_map(|(month, total)| {
                let z_score = (total - mean) / std_dev;
                if z_score <= config.z_threshold {
                    return None;
                }
                let severity = if z_score >= 3.0 {
                    Severity::High
                } else if z_score >= 2.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                let excess = month.total - mean_amount;
                let evidence = Evidence::default()
                    .fact("month", &month.period_key)
                    .fact("month_total", month.total)
                    .fact("mean", mean_amount)
                    .fact("transactions", month.count);
                Some(Finding {
                    severity,
                    monetary_value: excess,
                    evidence,
                    narrative: format!(
                        "Spending in {} was {}, {} above the monthly average of {} (z = {:.2})",
                        month.period_label, month.total, excess, mean_amount, z_score
                    ),
                    details: FindingDetails::Spike {
                        month: month.period_key.clone(),
                        month_total: month.total,
                        mean,
                        std_dev,
                        z_score,
                    },
                })
            })
            .collect();
        Ok(Outcome::Findings(findings))
    }
}
