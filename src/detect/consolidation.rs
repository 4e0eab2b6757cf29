use super::{AnalysisContext, Detector, DetectorKind, Outcome};
use crate::aggregate::group::{self, Groups};
use crate::model::{Amount, Evidence, Finding, FindingDetails, Severity, TransactionColumn};
use crate::Result;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

pub(crate) const NO_CATEGORY_COLUMN: &str = "no_category_column";
pub(crate) const NO_CATEGORIES: &str = "no_categories";

/// Flags spending categories served by many different suppliers, where fewer contracts could
/// buy the same goods for less.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationDetector;

impl Detector for ConsolidationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Consolidation
    }

    fn detect(&self, ctx: &AnalysisContext) -> Result<Outcome> {
        if !ctx.schema().contains(TransactionColumn::Category) {
            return Ok(Outcome::NotApplicable(NO_CATEGORY_COLUMN.to_string()));
        }
        let config = &ctx.config().consolidation;
        let categorised = ctx
            .transactions()
            .iter()
            .filter(|t| !t.category().trim().is_empty());
        let groups = Groups::by(categorised, |t| t.category().trim().to_string());
        if groups.len() == 0 {
            return Ok(Outcome::NotApplicable(NO_CATEGORIES.to_string()));
        }

        let mut findings = Vec::new();
        for (category, members) in groups.iter() {
            ctx.checkpoint()?;
            let supplier_count = members
                .iter()
                .map(|t| t.supplier_key())
                .collect::<HashSet<_>>()
                .len();
            if supplier_count < config.min_suppliers {
                continue;
            }
            let category_spend = group::total(members);
            let estimated_saving = category_spend.scale(config.savings_rate);
            if !estimated_saving.is_positive() {
                continue;
            }
            findings.push(Finding {
                severity: severity(estimated_saving),
                monetary_value: estimated_saving,
                evidence: Evidence::from_transactions(members.iter().copied(), ctx.evidence_cap())
                    .fact("supplier_count", supplier_count)
                    .fact("savings_rate", config.savings_rate),
                narrative: format!(
                    "{} suppliers shared {} of spend on {}; consolidating could save about {}",
                    supplier_count, category_spend, category, estimated_saving
                ),
                details: FindingDetails::Consolidation {
                    category: category.clone(),
                    supplier_count,
                    category_spend,
                    estimated_saving,
                },
            });
        }
        debug!(
            "Consolidation detector checked {} categories, flagged {}",
            groups.len(),
            findings.len()
        );
        Ok(Outcome::Findings(findings))
    }
}

fn severity(saving: Amount) -> Severity {
    if saving.value() >= Decimal::from(100_000) {
        Severity::High
    } else if saving.value() >= Decimal::from(10_000) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::detect::tests::{context, findings};
    use crate::detect::AnalysisContext;
    use crate::filter::Schema;
    use crate::model::Transaction;
    use crate::test::txn;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn suppliers(category: &str, names: &[&str], pounds: i64) -> Vec<Transaction> {
        names
            .iter()
            .map(|name| txn("2024-06-01", name, pounds).with_category(category))
            .collect()
    }

    #[test]
    fn test_flags_category_with_five_suppliers() {
        let mut txns = suppliers("Stationery", &["A", "B", "C", "D", "E"], 20_000);
        txns.extend(suppliers("IT", &["A", "B", "C", "D"], 1_000_000));
        let found = findings(&ConsolidationDetector, &context(txns));
        assert_eq!(found.len(), 1);
        let FindingDetails::Consolidation {
            category,
            supplier_count,
            category_spend,
            estimated_saving,
        } = &found[0].details
        else {
            panic!("wrong details: {:?}", found[0].details);
        };
        assert_eq!(category, "Stationery");
        assert_eq!(*supplier_count, 5);
        assert_eq!(*category_spend, Amount::pounds(100_000));
        assert_eq!(*estimated_saving, Amount::pounds(8_000));
        assert_eq!(found[0].severity, Severity::Low);
    }

    #[test]
    fn test_same_supplier_under_different_names_counts_once() {
        let txns = suppliers("Stationery", &["A", "A Ltd", "B", "C", "D"], 100);
        assert!(findings(&ConsolidationDetector, &context(txns)).is_empty());
    }

    #[test]
    fn test_not_applicable_without_categories() {
        let txns = vec![txn("2024-06-01", "A", 1)];
        assert_eq!(
            ConsolidationDetector.detect(&context(txns.clone())).unwrap(),
            Outcome::NotApplicable(NO_CATEGORIES.to_string())
        );

        let ctx = AnalysisContext::new(
            txns,
            Schema::canonical().without(TransactionColumn::Category),
            Arc::new(AnalysisConfig::default()),
            CancellationToken::new(),
        );
        assert_eq!(
            ConsolidationDetector.detect(&ctx).unwrap(),
            Outcome::NotApplicable(NO_CATEGORY_COLUMN.to_string())
        );
    }
}
