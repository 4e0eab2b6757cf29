//! Shared test utilities for building transaction fixtures.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::model::{Amount, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// The council used by fixtures that do not care which council they belong to.
pub const COUNCIL: &str = "leeds";

/// Parses an ISO date, panicking on bad fixture input.
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A transaction for a whole number of pounds in the default council.
pub fn txn(date_str: &str, supplier: &str, pounds: i64) -> Transaction {
    Transaction::new(date(date_str), supplier, Amount::pounds(pounds), COUNCIL)
}

/// A transaction with a decimal amount such as `"480.50"`.
pub fn txn_dec(date_str: &str, supplier: &str, amount: &str) -> Transaction {
    Transaction::new(
        date(date_str),
        supplier,
        Decimal::from_str(amount).unwrap(),
        COUNCIL,
    )
}

/// A transaction for a specific council.
pub fn txn_in(council: &str, date_str: &str, supplier: &str, pounds: i64) -> Transaction {
    Transaction::new(date(date_str), supplier, Amount::pounds(pounds), council)
}

/// One transaction per month starting in `first_month` (`YYYY-MM`), with the given totals.
pub fn monthly(first_year: i32, first_month: u32, totals: &[i64]) -> Vec<Transaction> {
    totals
        .iter()
        .enumerate()
        .map(|(i, total)| {
            let month0 = first_month - 1 + i as u32;
            let year = first_year + (month0 / 12) as i32;
            let month = month0 % 12 + 1;
            Transaction::new(
                NaiveDate::from_ymd_opt(year, month, 15).unwrap(),
                "Acme",
                Amount::pounds(*total),
                COUNCIL,
            )
        })
        .collect()
}
