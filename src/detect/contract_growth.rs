use super::{AnalysisContext, Detector, DetectorKind, Outcome};
use crate::aggregate::group::{self, Groups};
use crate::calendar::FinancialYear;
use crate::model::{Amount, Evidence, Finding, FindingDetails, Severity};
use crate::Result;
use tracing::debug;

/// Flags suppliers whose spend grew sharply from one financial year to the next.
///
/// Each (supplier, year) is compared with the same supplier in the immediately preceding year
/// only. A supplier with no positive spend in the previous year has no growth rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractGrowthDetector;

impl Detector for ContractGrowthDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ContractGrowth
    }

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
        let config = &ctx.config().contract_growth;
        let floor = Amount::new(config.spend_floor);
        let groups = Groups::by(ctx.transactions(), |t| (t.supplier_key(), t.financial_year()));

        let mut findings = Vec::new();
        for ((supplier_key, year), members) in groups.iter() {
            ctx.checkpoint()?;
            let current_spend = group::total(members);
            if current_spend <= floor {
                continue;
            }
            let Some(previous) = groups.get(&(supplier_key.clone(), year.previous())) else {
                continue;
            };
            let previous_spend = group::total(previous);
            if !previous_spend.is_positive() {
                continue;
            }
            let growth_pct =
                (current_spend.to_f64() - previous_spend.to_f64()) / previous_spend.to_f64() * 100.0;
            if growth_pct <= config.growth_threshold_pct {
                continue;
            }
            let estimated_saving = current_spend.scale(config.savings_rate);
            findings.push(growth_finding(
                ctx,
                members,
                *year,
                previous_spend,
                current_spend,
                growth_pct,
                estimated_saving,
            ));
        }
        debug!("Contract growth detector flagged {} suppliers", findings.len());
        Ok(Outcome::Findings(findings))
    }
}

fn growth_finding(
    ctx: &AnalysisContext,
    members: &[&crate::model::Transaction],
    financial_year: FinancialYear,
    previous_spend: Amount,
    current_spend: Amount,
    growth_pct: f64,
    estimated_saving: Amount,
) -> Finding {
    let supplier = members[0].supplier().to_string();
    let severity = if growth_pct >= 100.0 {
        Severity::High
    } else if growth_pct >= 50.0 {
        Severity::Medium
    } else {
        Severity::Low
    };
    Finding {
        severity,
        monetary_value: estimated_saving,
        evidence: Evidence::from_transactions(members.iter().copied(), ctx.evidence_cap())
            .fact("previous_year", financial_year.previous())
            .fact("previous_spend", previous_spend),
        narrative: format!(
            "Spend with {} rose {:.1}% to {} in {} (from {} in {}); renegotiating could save about {}",
            supplier,
            growth_pct,
            current_spend,
            financial_year,
            previous_spend,
            financial_year.previous(),
            estimated_saving
        ),
        details: FindingDetails::ContractGrowth {
            supplier,
            financial_year,
            previous_spend,
            current_spend,
            growth_pct,
            estimated_saving,
        },
    }
}
