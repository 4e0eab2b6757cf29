//! Time-bucketed and categorical aggregation of transactions.

pub(crate) mod group;

use crate::calendar;
use crate::model::{Amount, Transaction, TransactionColumn};
use group::Groups;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The width of an aggregation bucket.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    #[default]
    Monthly,
    Quarterly,
    FinancialYear,
    Total,
}

serde_plain::derive_display_from_serialize!(TimePeriod);
serde_plain::derive_fromstr_from_deserialize!(TimePeriod);

impl TimePeriod {
    /// Returns (sortable key, display label) for the bucket containing `txn`.
    fn bucket(&self, txn: &Transaction) -> (String, String) {
        let date = txn.date();
        match self {
            TimePeriod::Monthly => (calendar::month_key(date), calendar::month_label(date)),
            TimePeriod::Quarterly => {
                let fy = calendar::financial_year(date);
                let q = calendar::quarter(date);
                (
                    format!("{:04}-Q{q}", fy.start_year()),
                    format!("Q{q} {fy}"),
                )
            }
            TimePeriod::FinancialYear => {
                let fy = calendar::financial_year(date);
                (format!("{:04}", fy.start_year()), fy.to_string())
            }
            TimePeriod::Total => ("total".to_string(), "Total".to_string()),
        }
    }
}

/// One row of an aggregation: a period and, optionally, a category within it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    /// Sorts chronologically, e.g. `2024-04` or `2024-Q1`.
    pub period_key: String,
    /// For display, e.g. `Apr 2024` or `Q1 2024/25`.
    pub period_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub total: Amount,
    pub count: usize,
    pub distinct_suppliers: usize,
    pub average: Amount,
}

/// Aggregates `transactions` into one bucket per period, or per (period, category) when
/// `group_by` is given.
///
/// Buckets are sorted by period key. Within a period, categories appear in the order they were
/// first seen in `transactions`. The caller is responsible for `group_by` being a categorical
/// column (see `Schema::resolve_categorical`).
pub fn aggregate(
    transactions: &[Transaction],
    period: TimePeriod,
    group_by: Option<TransactionColumn>,
) -> Vec<AggregationBucket> {
    let category_of = |txn: &Transaction| -> Option<String> {
        group_by.map(|column| txn.text(column).unwrap_or_default().into_owned())
    };

    let mut category_rank: HashMap<Option<String>, usize> = HashMap::new();
    for txn in transactions {
        let next = category_rank.len();
        category_rank.entry(category_of(txn)).or_insert(next);
    }

    let groups = Groups::by(transactions, |txn| (period.bucket(txn), category_of(txn)));
    let mut buckets: Vec<(usize, AggregationBucket)> = groups
        .iter()
        .map(|(((period_key, period_label), category), members)| {
            let total = group::total(members);
            let count = members.len();
            let distinct_suppliers = members
                .iter()
                .map(|t| t.supplier_key())
                .collect::<HashSet<_>>()
                .len();
            let rank = category_rank.get(category).copied().unwrap_or_default();
            (
                rank,
                AggregationBucket {
                    period_key: period_key.clone(),
                    period_label: period_label.clone(),
                    category: category.clone(),
                    total,
                    count,
                    distinct_suppliers,
                    average: average(total, count),
                },
            )
        })
        .collect();

    buckets.sort_by(|(rank_a, a), (rank_b, b)| {
        a.period_key.cmp(&b.period_key).then(rank_a.cmp(rank_b))
    });
    buckets.into_iter().map(|(_, bucket)| bucket).collect()
}

/// Mean of `count` items totalling `total`, to the penny. Zero when `count` is zero.
pub(crate) fn average(total: Amount, count: usize) -> Amount {
    if count == 0 {
        return Amount::ZERO;
    }
    Amount::new((total.value() / Decimal::from(count)).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{txn, txn_dec};

    fn sample() -> Vec<Transaction> {
        vec![
            txn("2024-03-15", "Acme", 100).with_category("IT"),
            txn("2024-04-01", "Globex", 200).with_category("Facilities"),
            txn("2024-04-20", "Acme Ltd", 50).with_category("IT"),
            txn_dec("2024-07-02", "Initech", "33.33").with_category("IT"),
            txn("2025-01-09", "Globex", 400).with_category("Facilities"),
        ]
    }

    #[test]
    fn test_monthly_buckets_are_sorted() {
        let buckets = aggregate(&sample(), TimePeriod::Monthly, None);
        let keys: Vec<&str> = buckets.iter().map(|b| b.period_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03", "2024-04", "2024-07", "2025-01"]);
        let april = &buckets[1];
        assert_eq!(april.period_label, "Apr 2024");
        assert_eq!(april.total, Amount::pounds(250));
        assert_eq!(april.count, 2);
        assert_eq!(april.distinct_suppliers, 2);
        assert_eq!(april.average, Amount::pounds(125));
    }

    #[test]
    fn test_monthly_sum_equals_total() {
        let txns = sample();
        let monthly: Amount = aggregate(&txns, TimePeriod::Monthly, None)
            .iter()
            .map(|b| b.total)
            .sum();
        let total = aggregate(&txns, TimePeriod::Total, None);
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].total, monthly);
        assert_eq!(total[0].count, 5);
        // "Acme" and "Acme Ltd" are the same supplier.
        assert_eq!(total[0].distinct_suppliers, 3);
    }

    #[test]
    fn test_quarterly_and_financial_year_keys() {
        let quarterly = aggregate(&sample(), TimePeriod::Quarterly, None);
        let keys: Vec<(&str, &str)> = quarterly
            .iter()
            .map(|b| (b.period_key.as_str(), b.period_label.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2023-Q4", "Q4 2023/24"),
                ("2024-Q1", "Q1 2024/25"),
                ("2024-Q2", "Q2 2024/25"),
                ("2024-Q4", "Q4 2024/25"),
            ]
        );
        let fy = aggregate(&sample(), TimePeriod::FinancialYear, None);
        assert_eq!(fy.len(), 2);
        assert_eq!(fy[1].period_label, "2024/25");
        assert_eq!(fy[1].total.value(), Decimal::new(68333, 2));
    }

    #[test]
    fn test_grouped_buckets_use_first_seen_category_order() {
        let buckets = aggregate(
            &sample(),
            TimePeriod::FinancialYear,
            Some(TransactionColumn::Category),
        );
        let rows: Vec<(&str, Option<&str>)> = buckets
            .iter()
            .map(|b| (b.period_key.as_str(), b.category.as_deref()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2023", Some("IT")),
                ("2024", Some("IT")),
                ("2024", Some("Facilities")),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], TimePeriod::Total, None).is_empty());
        assert_eq!(average(Amount::pounds(10), 0), Amount::ZERO);
    }
}
