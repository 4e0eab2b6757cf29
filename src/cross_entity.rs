//! Comparison of what different councils pay the same suppliers.

use crate::aggregate::{self, group::Groups};
use crate::config::CrossEntityConfig;
use crate::model::{Amount, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One council's dealings with one supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySupplierStats {
    pub council_id: String,
    pub count: usize,
    pub total: Amount,
    pub average: Amount,
    pub median: Amount,
    /// Total divided by the council's population, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend_per_head: Option<f64>,
}

/// A supplier paid by at least two councils.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSupplier {
    /// The first name the supplier was seen under.
    pub supplier: String,
    pub combined_spend: Amount,
    /// `(max_avg - min_avg) / min_avg` across councils, if the smallest average is positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disparity: Option<f64>,
    /// Sorted by council id.
    pub entities: Vec<EntitySupplierStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossEntityComparison {
    pub council_count: usize,
    pub shared_supplier_count: usize,
    /// Largest disparity first. Only suppliers with significant combined spend.
    pub by_disparity: Vec<SharedSupplier>,
    /// Largest combined spend first.
    pub by_combined_spend: Vec<SharedSupplier>,
}

/// Finds suppliers shared between councils and how much their average payment differs.
#[derive(Debug, Clone, Default)]
pub struct CrossEntityComparator {
    config: CrossEntityConfig,
    populations: BTreeMap<String, u64>,
}

impl CrossEntityComparator {
    pub fn new(config: CrossEntityConfig) -> Self {
        Self {
            config,
            populations: BTreeMap::new(),
        }
    }

    /// Records the population of a council so that spend per head can be reported.
    pub fn with_population(mut self, council_id: impl Into<String>, population: u64) -> Self {
        if population > 0 {
            self.populations.insert(council_id.into(), population);
        }
        self
    }

    pub fn compare(&self, transactions: &[Transaction]) -> CrossEntityComparison {
        let council_count = Groups::by(transactions, |t| t.council_id().to_string()).len();
        let by_supplier = Groups::by(transactions, Transaction::supplier_key);

        let shared: Vec<SharedSupplier> = by_supplier.scan(|_, members| {
            let by_council = Groups::by(members.iter().copied(), |t| t.council_id().to_string());
            if by_council.len() < 2 {
                return vec![];
            }
            let mut entities: Vec<EntitySupplierStats> = by_council
                .iter()
                .map(|(council_id, txns)| self.entity_stats(council_id, txns))
                .collect();
            entities.sort_by(|a, b| a.council_id.cmp(&b.council_id));
            vec![SharedSupplier {
                supplier: members[0].supplier().to_string(),
                combined_spend: aggregate::group::total(members),
                disparity: disparity(&entities),
                entities,
            }]
        });
        let shared_supplier_count = shared.len();

        let floor = Amount::new(self.config.min_combined_spend);
        let mut by_disparity: Vec<SharedSupplier> = shared
            .iter()
            .filter(|s| s.disparity.is_some() && s.combined_spend > floor)
            .cloned()
            .collect();
        by_disparity.sort_by(|a, b| {
            b.disparity
                .unwrap_or_default()
                .total_cmp(&a.disparity.unwrap_or_default())
        });
        by_disparity.truncate(self.config.top_n);

        let mut by_combined_spend = shared;
        by_combined_spend.sort_by(|a, b| b.combined_spend.cmp(&a.combined_spend));
        by_combined_spend.truncate(self.config.top_n);

        debug!(
            "{} suppliers shared across {} councils",
            shared_supplier_count, council_count
        );
        CrossEntityComparison {
            council_count,
            shared_supplier_count,
            by_disparity,
            by_combined_spend,
        }
    }

    fn entity_stats(&self, council_id: &str, txns: &[&Transaction]) -> EntitySupplierStats {
        let total = aggregate::group::total(txns);
        let spend_per_head = self
            .populations
            .get(council_id)
            .map(|population| total.to_f64() / *population as f64);
        EntitySupplierStats {
            council_id: council_id.to_string(),
            count: txns.len(),
            total,
            average: aggregate::average(total, txns.len()),
            median: median(txns),
            spend_per_head,
        }
    }
}

fn median(txns: &[&Transaction]) -> Amount {
    let mut amounts: Vec<Decimal> = txns.iter().map(|t| t.amount().value()).collect();
    amounts.sort();
    let mid = amounts.len() / 2;
    match amounts.len() {
        0 => Amount::ZERO,
        n if n % 2 == 1 => Amount::new(amounts[mid]),
        _ => Amount::new(((amounts[mid - 1] + amounts[mid]) / Decimal::TWO).round_dp(2)),
    }
}

fn disparity(entities: &[EntitySupplierStats]) -> Option<f64> {
    let min = entities.iter().map(|e| e.average).min()?;
    let max = entities.iter().map(|e| e.average).max()?;
    if !min.is_positive() {
        return None;
    }
    Some((max.to_f64() - min.to_f64()) / min.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::txn_in;

    #[test]
    fn test_disparity_between_two_councils() {
        let txns = vec![
            txn_in("leeds", "2024-04-01", "Acme", 100),
            txn_in("leeds", "2024-04-02", "Acme", 100),
            txn_in("york", "2024-04-01", "ACME LTD", 200),
            txn_in("york", "2024-04-03", "Acme", 300),
            txn_in("york", "2024-04-03", "Solo", 999),
        ];
        let comparison = CrossEntityComparator::default().compare(&txns);
        assert_eq!(comparison.council_count, 2);
        assert_eq!(comparison.shared_supplier_count, 1);
        let acme = &comparison.by_combined_spend[0];
        assert_eq!(acme.disparity, Some(1.5));
        assert_eq!(acme.combined_spend, Amount::pounds(700));
        assert_eq!(acme.entities[1].council_id, "york");
        assert_eq!(acme.entities[1].average, Amount::pounds(250));
        assert_eq!(acme.entities[1].median, Amount::pounds(250));
        // Under the default combined-spend floor.
        assert!(comparison.by_disparity.is_empty());
    }

    #[test]
    fn test_ranking_and_populations() {
        let txns = vec![
            txn_in("leeds", "2024-04-01", "Acme", 20_000),
            txn_in("york", "2024-04-01", "Acme", 30_000),
            txn_in("leeds", "2024-04-01", "Globex", 10_000),
            txn_in("york", "2024-04-01", "Globex", 40_000),
            txn_in("leeds", "2024-04-01", "Initech", 100),
            txn_in("york", "2024-04-01", "Initech", 900),
        ];
        let comparator = CrossEntityComparator::new(CrossEntityConfig {
            top_n: 2,
            ..CrossEntityConfig::default()
        })
        .with_population("leeds", 800_000);
        let comparison = comparator.compare(&txns);
        let names: Vec<&str> = comparison
            .by_disparity
            .iter()
            .map(|s| s.supplier.as_str())
            .collect();
        assert_eq!(names, vec!["Globex", "Acme"]);
        let names: Vec<&str> = comparison
            .by_combined_spend
            .iter()
            .map(|s| s.supplier.as_str())
            .collect();
        assert_eq!(names, vec!["Acme", "Globex"]);
        let leeds = &comparison.by_combined_spend[0].entities[0];
        assert_eq!(leeds.spend_per_head, Some(0.025));
        assert!(comparison.by_combined_spend[0].entities[1]
            .spend_per_head
            .is_none());
    }

    #[test]
    fn test_non_positive_average_has_no_disparity() {
        let txns = vec![
            txn_in("leeds", "2024-04-01", "Acme", -100),
            txn_in("york", "2024-04-01", "Acme", 100),
        ];
        let comparison = CrossEntityComparator::default().compare(&txns);
        assert_eq!(comparison.by_combined_spend[0].disparity, None);
    }
}
