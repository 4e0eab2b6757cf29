use crate::args::CompareArgs;
use crate::commands::{load, Out};
use crate::config::AnalysisConfig;
use crate::cross_entity::{CrossEntityComparator, CrossEntityComparison};
use crate::Result;

/// Compares the councils in the input file: which suppliers they share and how different their
/// average payments to those suppliers are.
pub async fn compare(config: AnalysisConfig, args: &CompareArgs) -> Result<Out<CrossEntityComparison>> {
    let transactions = load(args.input()).await?;
    let mut comparator = CrossEntityComparator::new(config.cross_entity);
    for (council, population) in args.populations()? {
        comparator = comparator.with_population(council, population);
    }
    let comparison = comparator.compare(&transactions);
    let message = if comparison.council_count < 2 {
        format!(
            "Found {} council in the input; at least two are needed for a comparison",
            comparison.council_count
        )
    } else {
        format!(
            "{} suppliers are shared across {} councils",
            comparison.shared_supplier_count, comparison.council_count
        )
    };
    Ok(Out::new(message, comparison))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::InputArgs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_compare_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spend.csv");
        let csv = "\
date,supplier,amount,council_id
2024-04-01,Acme,100,leeds
2024-04-01,Acme,250,york
2024-04-01,Globex,10,york
";
        tokio::fs::write(&path, csv).await.unwrap();
        let args = CompareArgs::new(InputArgs::new(&path)).with_population("york", 200_000);
        let out = compare(AnalysisConfig::default(), &args).await.unwrap();
        let comparison = out.structure().unwrap();
        assert_eq!(comparison.shared_supplier_count, 1);
        assert_eq!(comparison.by_combined_spend[0].disparity, Some(1.5));
        assert!(comparison.by_combined_spend[0].entities[1]
            .spend_per_head
            .is_some());
        assert_eq!(out.message(), "1 suppliers are shared across 2 councils");
    }
}
