//! Reads canonical-schema transactions from CSV or JSON.
//!
//! Council publications come in many layouts; converting them to the canonical schema happens
//! upstream. What arrives here has the headers `date,supplier,amount,category,unit,council_id,
//! reference` in any order. Unknown headers are ignored and header case does not matter. Amounts
//! may carry a `£` sign and thousands separators.

use crate::error::{Error, ErrorType, IntoResult};
use crate::model::{Transaction, TransactionRecord};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// The encoding of an input file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Csv,
    Json,
}

serde_plain::derive_display_from_serialize!(InputFormat);
serde_plain::derive_fromstr_from_deserialize!(InputFormat);

impl InputFormat {
    /// Guesses the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

/// Options that apply to every record read.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Used for records that have no `council_id` of their own.
    pub default_council: Option<String>,
}

impl IngestOptions {
    fn record(&self) -> TransactionRecord {
        let mut record = TransactionRecord::default();
        if let Some(council) = &self.default_council {
            // Cannot fail: the council id column takes any non-blank text.
            let _ = record.set_with_header("council_id", council);
        }
        record
    }
}

/// Reads canonical CSV. The first line must be the header row.
///
/// # Errors
/// A record that is missing a required field or has an unparseable date or amount is rejected
/// with `ErrorType::MalformedRecord`; the message names the line.
pub fn read_csv<R: Read>(reader: R, options: &IngestOptions) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .context("Unable to read the CSV header row")
        .pub_result(ErrorType::MalformedRecord)?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();

    let mut transactions = Vec::new();
    for result in rdr.records() {
        let row = result
            .context("Unable to read CSV record")
            .pub_result(ErrorType::MalformedRecord)?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut record = options.record();
        let built = headers
            .iter()
            .zip(row.iter())
            .try_for_each(|(header, value)| record.set_with_header(header, value))
            .and_then(|_| record.build());
        match built {
            Ok(txn) => transactions.push(txn),
            Err(e) => return Err(Error::malformed(format!("Line {line}: {e:#}"))),
        }
    }
    debug!("Read {} transactions from CSV", transactions.len());
    Ok(transactions)
}

/// Reads a JSON array of canonical records. Values may be strings or numbers.
pub fn read_json<R: Read>(reader: R, options: &IngestOptions) -> Result<Vec<Transaction>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_reader(reader)
        .context("Expected a JSON array of objects")
        .pub_result(ErrorType::MalformedRecord)?;

    let mut transactions = Vec::with_capacity(rows.len());
    for (ix, row) in rows.iter().enumerate() {
        let mut record = options.record();
        let built = row
            .iter()
            .try_for_each(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                record.set_with_header(&key.to_ascii_lowercase(), &text)
            })
            .and_then(|_| record.build());
        match built {
            Ok(txn) => transactions.push(txn),
            Err(e) => return Err(Error::malformed(format!("Record {}: {e:#}", ix + 1))),
        }
    }
    debug!("Read {} transactions from JSON", transactions.len());
    Ok(transactions)
}

/// Reads a whole file, choosing the parser from `format` or else the file extension.
pub async fn read_file(
    path: &Path,
    format: Option<InputFormat>,
    options: &IngestOptions,
) -> Result<Vec<Transaction>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Unable to read {}", path.display()))
        .pub_result(ErrorType::Io)?;
    let format = format.unwrap_or_else(|| InputFormat::from_path(path));
    let transactions = match format {
        InputFormat::Csv => read_csv(bytes.as_slice(), options)?,
        InputFormat::Json => read_json(bytes.as_slice(), options)?,
    };
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        path.display()
    );
    Ok(transactions)
}
