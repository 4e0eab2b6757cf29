use crate::model::{Transaction, TransactionColumn};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Date(NaiveDate),
    Amount(Decimal),
    Int(i64),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ge,
    Le,
}

impl CompareOp {
    fn holds<T: PartialOrd>(&self, left: &T, right: &T) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ge => left >= right,
            CompareOp::Le => left <= right,
        }
    }

    pub(super) fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

/// A validated filter expression over canonical transaction columns.
///
/// Predicates are only built by `FilterSpec::compile`, which checks every column against a
/// `Schema` first. They can be evaluated in memory with `matches` or compiled to SQL with
/// `to_sql`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every transaction.
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        column: TransactionColumn,
        op: CompareOp,
        value: Value,
    },
    In {
        column: TransactionColumn,
        values: Vec<Value>,
    },
    /// Case-insensitive substring match.
    Contains {
        column: TransactionColumn,
        needle: String,
    },
}

impl Predicate {
    pub(crate) fn and(mut clauses: Vec<Predicate>) -> Predicate {
        match clauses.len() {
            0 => Predicate::All,
            1 => clauses.remove(0),
            _ => Predicate::And(clauses),
        }
    }

    pub(crate) fn or(mut clauses: Vec<Predicate>) -> Predicate {
        match clauses.len() {
            1 => clauses.remove(0),
            _ => Predicate::Or(clauses),
        }
    }

    /// Evaluates the predicate against a single transaction.
    pub fn matches(&self, txn: &Transaction) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(clauses) => clauses.iter().all(|p| p.matches(txn)),
            Predicate::Or(clauses) => clauses.iter().any(|p| p.matches(txn)),
            Predicate::Compare { column, op, value } => compare(txn, *column, *op, value),
            Predicate::In { column, values } => values
                .iter()
                .any(|value| compare(txn, *column, CompareOp::Eq, value)),
            Predicate::Contains { column, needle } => txn
                .text(*column)
                .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

fn compare(txn: &Transaction, column: TransactionColumn, op: CompareOp, value: &Value) -> bool {
    match (column, value) {
        (TransactionColumn::Date, Value::Date(d)) => op.holds(&txn.date(), d),
        (TransactionColumn::Amount, Value::Amount(a)) => op.holds(&txn.amount().value(), a),
        (TransactionColumn::Quarter, Value::Int(q)) => op.holds(&i64::from(txn.quarter()), q),
        (_, Value::Text(s)) => txn
            .text(column)
            .map(|text| op.holds(&text.as_ref(), &s.as_str()))
            .unwrap_or(false),
        // A type mismatch cannot be produced by `FilterSpec::compile`.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::txn;

    #[test]
    fn test_all_matches() {
        assert!(Predicate::All.matches(&txn("2024-01-01", "Acme", 1)));
    }

    #[test]
    fn test_in_and_contains() {
        let t = txn("2024-01-01", "Acme Cleaning", 100).with_category("Facilities");
        let in_pred = Predicate::In {
            column: TransactionColumn::Category,
            values: vec![Value::Text("IT".into()), Value::Text("Facilities".into())],
        };
        assert!(in_pred.matches(&t));
        let contains = Predicate::Contains {
            column: TransactionColumn::Supplier,
            needle: "CLEAN".into(),
        };
        assert!(contains.matches(&t));
        let missing_ref = Predicate::Contains {
            column: TransactionColumn::Reference,
            needle: "inv".into(),
        };
        assert!(!missing_ref.matches(&t));
    }

    #[test]
    fn test_compare_amount_and_quarter() {
        let t = txn("2024-07-15", "Acme", 500);
        let ge = Predicate::Compare {
            column: TransactionColumn::Amount,
            op: CompareOp::Ge,
            value: Value::Amount(Decimal::from(500)),
        };
        let q2 = Predicate::Compare {
            column: TransactionColumn::Quarter,
            op: CompareOp::Eq,
            value: Value::Int(2),
        };
        assert!(Predicate::and(vec![ge, q2]).matches(&t));
    }

    #[test]
    fn test_combinators_collapse() {
        assert_eq!(Predicate::and(vec![]), Predicate::All);
        assert_eq!(Predicate::or(vec![Predicate::All]), Predicate::All);
    }
}
