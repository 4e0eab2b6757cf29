//! Filter specifications and the schema they are validated against.
//!
//! A `FilterSpec` records what a user picked: date and amount ranges, financial years, a
//! quarter, categorical facets and a free-text search. Nothing in it is trusted until
//! `FilterSpec::compile` has checked every column name against a `Schema` and produced a typed
//! `Predicate`.

mod predicate;
mod sql;

pub use predicate::{CompareOp, Predicate, Value};
pub use sql::SqlWhere;

use crate::calendar::FinancialYear;
use crate::error::Error;
use crate::model::{Transaction, TransactionColumn};
use crate::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::trace;

/// The columns available for one entity's data.
///
/// The canonical schema has every column. Councils that do not publish, for example, a
/// category have a reduced schema, and anything that needs the missing column must say so.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: BTreeSet<TransactionColumn>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl Schema {
    pub fn canonical() -> Self {
        Self {
            columns: TransactionColumn::ALL.into_iter().collect(),
        }
    }

    pub fn from_columns(columns: impl IntoIterator<Item = TransactionColumn>) -> Self {
        let mut columns: BTreeSet<TransactionColumn> = columns.into_iter().collect();
        if columns.contains(&TransactionColumn::Date) {
            columns.insert(TransactionColumn::FinancialYear);
            columns.insert(TransactionColumn::Quarter);
        }
        Self { columns }
    }

    /// Infers the schema from data: optional text columns that are blank in every transaction
    /// are treated as not published.
    pub fn infer(transactions: &[Transaction]) -> Self {
        let mut columns = vec![
            TransactionColumn::Date,
            TransactionColumn::Supplier,
            TransactionColumn::Amount,
            TransactionColumn::CouncilId,
        ];
        if transactions.iter().any(|t| !t.category().trim().is_empty()) {
            columns.push(TransactionColumn::Category);
        }
        if transactions.iter().any(|t| !t.unit().trim().is_empty()) {
            columns.push(TransactionColumn::Unit);
        }
        if transactions.iter().any(|t| t.reference().is_some()) {
            columns.push(TransactionColumn::Reference);
        }
        Self::from_columns(columns)
    }

    pub fn without(mut self, column: TransactionColumn) -> Self {
        self.columns.remove(&column);
        self
    }

    pub fn contains(&self, column: TransactionColumn) -> bool {
        self.columns.contains(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = TransactionColumn> + '_ {
        self.columns.iter().copied()
    }

    /// Resolves a user-supplied column name. Unknown names are a schema error.
    pub fn resolve(&self, name: &str) -> Result<TransactionColumn> {
        let column = TransactionColumn::from_str(name.trim())
            .map_err(|_| Error::schema(format!("Unknown column '{name}'")))?;
        self.require(column)?;
        Ok(column)
    }

    /// Resolves a column that will be grouped on; it must be categorical.
    pub fn resolve_categorical(&self, name: &str) -> Result<TransactionColumn> {
        let column = self.resolve(name)?;
        if !column.is_categorical() {
            return Err(Error::schema(format!(
                "Column '{column}' is not categorical"
            )));
        }
        Ok(column)
    }

    fn require(&self, column: TransactionColumn) -> Result<()> {
        if self.contains(column) {
            Ok(())
        } else {
            Err(Error::schema(format!(
                "Column '{column}' is not available for this data set"
            )))
        }
    }
}

/// The user's filter choices. Immutable once built; construct it with the builder methods.
///
/// ```
/// # use council_spend_audit::filter::{FilterSpec, Schema};
/// let filter = FilterSpec::new()
///     .facet("supplier", ["Acme Ltd", "Globex"])
///     .search("cleaning");
/// assert!(filter.compile(&Schema::canonical()).is_ok());
/// assert!(FilterSpec::new().facet("password", ["x"]).compile(&Schema::canonical()).is_err());
/// ```
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FilterSpec {
    /// Inclusive lower bound on the transaction date.
    date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the transaction date.
    date_to: Option<NaiveDate>,
    /// Inclusive lower bound on the amount.
    amount_min: Option<Decimal>,
    /// Inclusive upper bound on the amount.
    amount_max: Option<Decimal>,
    /// Financial years, e.g. "2023/24". Any of them may match.
    financial_years: BTreeSet<FinancialYear>,
    /// Financial quarter, 1 to 4.
    quarter: Option<u8>,
    /// Column name to the values selected for it. Facets AND together; values within a facet OR
    /// together.
    facets: BTreeMap<String, BTreeSet<String>>,
    /// Case-insensitive text matched against supplier, category, unit and reference.
    search: Option<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn amount_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.amount_min = min;
        self.amount_max = max;
        self
    }

    pub fn financial_year(mut self, year: FinancialYear) -> Self {
        self.financial_years.insert(year);
        self
    }

    pub fn quarter(mut self, quarter: u8) -> Self {
        self.quarter = Some(quarter);
        self
    }

    pub fn facet<S, I>(mut self, column: impl Into<String>, values: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        self.facets
            .entry(column.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn facets(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.facets
    }

    pub fn financial_years(&self) -> &BTreeSet<FinancialYear> {
        &self.financial_years
    }

    /// A stable hash of the filter, used as part of cache keys.
    pub fn filter_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Validates the filter against `schema` and builds the predicate tree.
    ///
    /// # Errors
    /// Returns an `ErrorType::Schema` error when a facet names an unknown or unavailable
    /// column, a facet has no values, a facet is on a non-categorical column, a range is
    /// inverted or the quarter is outside 1 to 4.
    pub fn compile(&self, schema: &Schema) -> Result<Predicate> {
        let mut clauses = Vec::new();

        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(Error::schema(format!(
                    "Date range is inverted: {from} is after {to}"
                )));
            }
        }
        if let Some(from) = self.date_from {
            schema.require(TransactionColumn::Date)?;
            clauses.push(compare(TransactionColumn::Date, CompareOp::Ge, Value::Date(from)));
        }
        if let Some(to) = self.date_to {
            schema.require(TransactionColumn::Date)?;
            clauses.push(compare(TransactionColumn::Date, CompareOp::Le, Value::Date(to)));
        }

        if let (Some(min), Some(max)) = (self.amount_min, self.amount_max) {
            if min > max {
                return Err(Error::schema(format!(
                    "Amount range is inverted: {min} is greater than {max}"
                )));
            }
        }
        if let Some(min) = self.amount_min {
            schema.require(TransactionColumn::Amount)?;
            clauses.push(compare(
                TransactionColumn::Amount,
                CompareOp::Ge,
                Value::Amount(min),
            ));
        }
        if let Some(max) = self.amount_max {
            schema.require(TransactionColumn::Amount)?;
            clauses.push(compare(
                TransactionColumn::Amount,
                CompareOp::Le,
                Value::Amount(max),
            ));
        }

        if !self.financial_years.is_empty() {
            schema.require(TransactionColumn::FinancialYear)?;
            clauses.push(financial_years_clause(self.financial_years.iter()));
        }

        if let Some(quarter) = self.quarter {
            if !(1..=4).contains(&quarter) {
                return Err(Error::schema(format!(
                    "Quarter must be between 1 and 4, got {quarter}"
                )));
            }
            schema.require(TransactionColumn::Quarter)?;
            clauses.push(compare(
                TransactionColumn::Quarter,
                CompareOp::Eq,
                Value::Int(i64::from(quarter)),
            ));
        }

        for (name, values) in &self.facets {
            let column = schema.resolve_categorical(name)?;
            if values.is_empty() {
                return Err(Error::schema(format!(
                    "Facet '{column}' has no selected values"
                )));
            }
            if column == TransactionColumn::FinancialYear {
                // Year facets become date ranges so that no store needs a derived column.
                let years = values
                    .iter()
                    .map(|v| {
                        FinancialYear::from_str(v).map_err(|e| {
                            Error::schema(format!("Invalid financial year facet '{v}': {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                clauses.push(financial_years_clause(years.iter()));
            } else {
                clauses.push(Predicate::In {
                    column,
                    values: values.iter().cloned().map(Value::Text).collect(),
                });
            }
        }

        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                let searchable: Vec<Predicate> = TransactionColumn::SEARCHABLE
                    .into_iter()
                    .filter(|c| schema.contains(*c))
                    .map(|column| Predicate::Contains {
                        column,
                        needle: search.to_string(),
                    })
                    .collect();
                if searchable.is_empty() {
                    return Err(Error::schema("No searchable columns are available"));
                }
                clauses.push(Predicate::or(searchable));
            }
        }

        let predicate = Predicate::and(clauses);
        trace!("Compiled filter {self:?} into {predicate:?}");
        Ok(predicate)
    }
}

fn compare(column: TransactionColumn, op: CompareOp, value: Value) -> Predicate {
    Predicate::Compare { column, op, value }
}

fn financial_years_clause<'a>(years: impl Iterator<Item = &'a FinancialYear>) -> Predicate {
    Predicate::or(
        years
            .map(|fy| {
                let (start, end) = fy.bounds();
                Predicate::And(vec![
                    compare(TransactionColumn::Date, CompareOp::Ge, Value::Date(start)),
                    compare(TransactionColumn::Date, CompareOp::Le, Value::Date(end)),
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use crate::test::txn;

    fn sample() -> Vec<Transaction> {
        vec![
            txn("2023-05-10", "Acme Cleaning", 1200).with_category("Facilities"),
            txn("2024-02-01", "Globex IT", 300).with_category("IT"),
            txn("2024-04-02", "Initech", 75)
                .with_category("IT")
                .with_reference("INV-77"),
        ]
    }

    fn count(filter: &FilterSpec) -> usize {
        let predicate = filter.compile(&Schema::canonical()).unwrap();
        sample().iter().filter(|t| predicate.matches(t)).count()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = FilterSpec::new();
        assert!(filter.is_empty());
        assert_eq!(filter.compile(&Schema::canonical()).unwrap(), Predicate::All);
        assert_eq!(count(&filter), 3);
    }

    #[test]
    fn test_filter_schema_describes_financial_years() {
        let schema = schemars::schema_for!(FilterSpec);
        let value = schema.as_value();
        assert!(value["properties"]["facets"].is_object());
        let years = &value["properties"]["financial_years"]["items"];
        assert_eq!(years["type"], "string");
    }

    #[test]
    fn test_out_of_range_financial_year_is_rejected() {
        let json = r#"{"financial_years": ["999999/00"]}"#;
        assert!(serde_json::from_str::<FilterSpec>(json).is_err());
        let json = r#"{"financial_years": ["2023/24"]}"#;
        let filter: FilterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(count(&filter), 2);
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let err = FilterSpec::new()
            .facet("supplier; DROP TABLE x", ["a"])
            .compile(&Schema::canonical())
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Schema);
    }

    #[test]
    fn test_column_missing_from_entity_schema() {
        let schema = Schema::canonical().without(TransactionColumn::Category);
        let err = FilterSpec::new()
            .facet("category", ["IT"])
            .compile(&schema)
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Schema);
    }

    #[test]
    fn test_non_categorical_facet_is_rejected() {
        let err = FilterSpec::new()
            .facet("amount", ["100"])
            .compile(&Schema::canonical())
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Schema);
    }

    #[test]
    fn test_empty_facet_selection_is_rejected() {
        let filter = FilterSpec::new().facet("supplier", Vec::<String>::new());
        assert!(filter.compile(&Schema::canonical()).is_err());
    }

    #[test]
    fn test_facets_and_together_values_or_together() {
        let filter = FilterSpec::new().facet("category", ["IT", "Facilities"]);
        assert_eq!(count(&filter), 3);
        let filter = filter.facet("supplier", ["Initech"]);
        assert_eq!(count(&filter), 1);
    }

    #[test]
    fn test_search_ors_across_columns() {
        // "it" appears in a supplier, a category and in "Facilities".
        assert_eq!(count(&FilterSpec::new().search("it")), 3);
        assert_eq!(count(&FilterSpec::new().search("facil")), 1);
        assert_eq!(count(&FilterSpec::new().search("GLOBEX")), 1);
        assert_eq!(count(&FilterSpec::new().search("inv-77")), 1);
        assert_eq!(count(&FilterSpec::new().search("   ")), 3);
    }

    #[test]
    fn test_financial_years_and_quarter() {
        let fy = FilterSpec::new().financial_year(FinancialYear::new(2023));
        assert_eq!(count(&fy), 2);
        let facet = FilterSpec::new().facet("financial_year", ["2024/25"]);
        assert_eq!(count(&facet), 1);
        let q4 = FilterSpec::new().quarter(4);
        assert_eq!(count(&q4), 1);
        assert!(FilterSpec::new()
            .quarter(5)
            .compile(&Schema::canonical())
            .is_err());
        assert!(FilterSpec::new()
            .facet("financial_year", ["2024"])
            .compile(&Schema::canonical())
            .is_err());
    }

    #[test]
    fn test_ranges_are_inclusive_and_validated() {
        let filter = FilterSpec::new().amount_range(Some(Decimal::from(300)), None);
        assert_eq!(count(&filter), 2);
        let inverted =
            FilterSpec::new().amount_range(Some(Decimal::from(10)), Some(Decimal::from(1)));
        assert!(inverted.compile(&Schema::canonical()).is_err());
        let dates = FilterSpec::new().date_range(
            NaiveDate::from_ymd_opt(2024, 2, 1),
            NaiveDate::from_ymd_opt(2024, 4, 2),
        );
        assert_eq!(count(&dates), 2);
    }

    #[test]
    fn test_filter_hash_is_stable_and_distinguishing() {
        let a = FilterSpec::new().facet("supplier", ["Acme"]);
        let b = FilterSpec::new().facet("supplier", ["Acme"]);
        let c = FilterSpec::new().facet("supplier", ["Globex"]);
        assert_eq!(a.filter_hash(), b.filter_hash());
        assert_ne!(a.filter_hash(), c.filter_hash());
    }

    #[test]
    fn test_schema_infer() {
        let schema = Schema::infer(&[txn("2024-01-01", "Acme", 1)]);
        assert!(!schema.contains(TransactionColumn::Category));
        assert!(schema.contains(TransactionColumn::Quarter));
        let schema = Schema::infer(&sample());
        assert!(schema.contains(TransactionColumn::Category));
        assert!(schema.contains(TransactionColumn::Reference));
    }

    #[test]
    fn test_filter_spec_deserializes_with_defaults() {
        let json = r#"{"facets": {"supplier": ["Acme"]}, "financial_years": ["2023/24"]}"#;
        let filter: FilterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(filter.financial_years().len(), 1);
        assert_eq!(filter.facets()["supplier"].len(), 1);
    }
}
