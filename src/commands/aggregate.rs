use crate::aggregate::{self, AggregationBucket};
use crate::args::AggregateArgs;
use crate::commands::{load, Out};
use crate::filter::Schema;
use crate::model::Transaction;
use crate::Result;
use tracing::debug;

/// Totals the filtered transactions by period and, optionally, by a categorical column.
///
/// # Errors
/// - Returns an error if the input cannot be read or parsed.
/// - Returns an `ErrorType::Schema` error if the filter or `--group-by` names an unknown or
///   non-categorical column.
pub async fn aggregate(args: &AggregateArgs) -> Result<Out<Vec<AggregationBucket>>> {
    let transactions = load(args.input()).await?;
    let schema = Schema::infer(&transactions);
    let predicate = args.filter().to_filter()?.compile(&schema)?;
    let group_by = args
        .group_by()
        .map(|name| schema.resolve_categorical(name))
        .transpose()?;

    let filtered: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| predicate.matches(t))
        .collect();
    debug!("{} transactions match the filter", filtered.len());

    let buckets = aggregate::aggregate(&filtered, args.period(), group_by);
    let message = format!(
        "{} {} buckets from {} transactions",
        buckets.len(),
        args.period(),
        filtered.len()
    );
    Ok(Out::new(message, buckets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TimePeriod;
    use crate::args::{FilterArgs, InputArgs};
    use crate::ErrorType;
    use tempfile::TempDir;

    async fn input(dir: &TempDir) -> InputArgs {
        let path = dir.path().join("spend.json");
        let json = r#"[
            {"date": "2024-04-01", "supplier": "Acme", "amount": "100", "council_id": "leeds", "category": "IT"},
            {"date": "2024-04-20", "supplier": "Globex", "amount": "50", "council_id": "leeds", "category": "IT"},
            {"date": "2025-01-02", "supplier": "Acme", "amount": "25", "council_id": "leeds", "category": "Legal"}
        ]"#;
        tokio::fs::write(&path, json).await.unwrap();
        InputArgs::new(path)
    }

    #[tokio::test]
    async fn test_aggregate_by_quarter() {
        let dir = TempDir::new().unwrap();
        let args = AggregateArgs::new(input(&dir).await, FilterArgs::default(), TimePeriod::Quarterly);
        let out = aggregate(&args).await.unwrap();
        let buckets = out.structure().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].period_label, "Q1 2024/25");
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].period_label, "Q4 2024/25");
    }

    #[tokio::test]
    async fn test_group_by_must_be_categorical() {
        let dir = TempDir::new().unwrap();
        let args = AggregateArgs::new(input(&dir).await, FilterArgs::default(), TimePeriod::Total)
            .with_group_by("amount");
        let err = aggregate(&args).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Schema);
    }
}
