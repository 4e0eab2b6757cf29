//! Compiles a `Predicate` into a parameterised SQL `WHERE` fragment.
//!
//! Column identifiers come only from `TransactionColumn::as_str` and every user value travels as
//! a positional `?` parameter, so no user text is ever spliced into the SQL. The quarter
//! expression uses SQLite's `strftime`.

use super::predicate::{CompareOp, Predicate, Value};
use crate::model::TransactionColumn;
use serde::Serialize;

/// A compiled `WHERE` clause and its positional parameters.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SqlWhere {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    /// Compiles to a SQL boolean expression with `?` placeholders.
    pub fn to_sql(&self) -> SqlWhere {
        let mut params = Vec::new();
        let clause = write_sql(self, &mut params);
        SqlWhere { clause, params }
    }
}

fn write_sql(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::All => "1 = 1".to_string(),
        Predicate::And(clauses) => join(clauses, " AND ", params),
        Predicate::Or(clauses) if clauses.is_empty() => "1 = 0".to_string(),
        Predicate::Or(clauses) => join(clauses, " OR ", params),
        Predicate::Compare { column, op, value } => {
            params.push(value.clone());
            format!("{} {} ?", column_expr(*column), op.as_sql())
        }
        Predicate::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
        Predicate::In { column, values } => {
            params.extend(values.iter().cloned());
            let placeholders = vec!["?"; values.len()].join(", ");
            format!("{} IN ({placeholders})", column_expr(*column))
        }
        Predicate::Contains { column, needle } => {
            params.push(Value::Text(format!(
                "%{}%",
                escape_like(&needle.to_lowercase())
            )));
            format!("LOWER({}) LIKE ? ESCAPE '\\'", column_expr(*column))
        }
    }
}

fn join(clauses: &[Predicate], separator: &str, params: &mut Vec<Value>) -> String {
    let parts: Vec<String> = clauses.iter().map(|c| write_sql(c, params)).collect();
    format!("({})", parts.join(separator))
}

fn column_expr(column: TransactionColumn) -> String {
    match column {
        // Month 4 (April) maps to quarter 1, month 1 (January) to quarter 4.
        TransactionColumn::Quarter => {
            "(((CAST(strftime('%m', \"date\") AS INTEGER) + 8) % 12) / 3 + 1)".to_string()
        }
        other => format!("\"{}\"", other.as_str()),
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn test_all_is_tautology() {
        let sql = Predicate::All.to_sql();
        assert_eq!(sql.clause, "1 = 1");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_user_text_is_parameterised() {
        let hostile = "x'; DROP TABLE transactions; --";
        let predicate = Predicate::And(vec![
            Predicate::In {
                column: TransactionColumn::Supplier,
                values: vec![Value::Text(hostile.to_string())],
            },
            Predicate::Compare {
                column: TransactionColumn::Amount,
                op: CompareOp::Ge,
                value: Value::Amount(Decimal::from(500)),
            },
        ]);
        let sql = predicate.to_sql();
        assert_eq!(sql.clause, "(\"supplier\" IN (?) AND \"amount\" >= ?)");
        assert!(!sql.clause.contains("DROP"));
        assert_eq!(sql.params[0], Value::Text(hostile.to_string()));
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let predicate = Predicate::Or(vec![
            Predicate::Contains {
                column: TransactionColumn::Supplier,
                needle: "100%_Pure".to_string(),
            },
            Predicate::Compare {
                column: TransactionColumn::Date,
                op: CompareOp::Le,
                value: Value::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()),
            },
        ]);
        let sql = predicate.to_sql();
        assert_eq!(
            sql.clause,
            "(LOWER(\"supplier\") LIKE ? ESCAPE '\\' OR \"date\" <= ?)"
        );
        assert_eq!(sql.params[0], Value::Text("%100\\%\\_pure%".to_string()));
    }

    #[test]
    fn test_quarter_expression() {
        let sql = Predicate::Compare {
            column: TransactionColumn::Quarter,
            op: CompareOp::Eq,
            value: Value::Int(1),
        }
        .to_sql();
        assert!(sql.clause.starts_with("(((CAST(strftime('%m', \"date\")"));
        assert_eq!(sql.params, vec![Value::Int(1)]);
    }
}
