//! Rolls detector findings up into one estimate of recoverable money.

use crate::config::SavingsRates;
use crate::detect::DetectorReport;
use crate::model::{Amount, Finding, FindingDetails};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SavingsSummary {
    pub duplicate_savings: Amount,
    pub small_txn_savings: Amount,
    pub contract_savings: Amount,
    pub consolidation_savings: Amount,
    pub total_potential: Amount,
}

impl SavingsSummary {
    /// Sums the findings of every completed detector.
    ///
    /// Reports that did not complete carry no findings and so contribute nothing. Spikes are
    /// informational and never count towards savings.
    pub fn estimate(reports: &[DetectorReport], rates: &SavingsRates) -> Self {
        Self::from_findings(
            reports
                .iter()
                .filter(|r| r.status.is_completed())
                .flat_map(|r| r.findings.iter()),
            rates,
        )
    }

    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>, rates: &SavingsRates) -> Self {
        let mut summary = SavingsSummary::default();
        for finding in findings {
            match &finding.details {
                FindingDetails::Duplicate {
                    potential_overpayment,
                    ..
                } => {
                    summary.duplicate_savings = summary.duplicate_savings
                        + potential_overpayment.scale(rates.duplicate_recovery_rate);
                }
                FindingDetails::Split { payment_count, .. } => {
                    let avoidable = Decimal::from(payment_count.saturating_sub(1));
                    summary.small_txn_savings = summary.small_txn_savings
                        + Amount::new(avoidable * rates.processing_cost_per_transaction);
                }
                FindingDetails::ContractGrowth {
                    estimated_saving, ..
                } => {
                    summary.contract_savings = summary.contract_savings + *estimated_saving;
                }
                FindingDetails::Consolidation {
                    estimated_saving, ..
                } => {
                    summary.consolidation_savings =
                        summary.consolidation_savings + *estimated_saving;
                }
                FindingDetails::Spike { .. } => {}
            }
        }
        summary.total_potential = summary.duplicate_savings
            + summary.small_txn_savings
            + summary.contract_savings
            + summary.consolidation_savings;
        summary
    }
}
