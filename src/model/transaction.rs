use crate::calendar::{self, FinancialYear};
use crate::model::Amount;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// A single payment from a council's published spending data, in the canonical schema.
///
/// Transactions are immutable once built. The financial year and quarter are derived from `date`
/// on demand and are never stored.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    date: NaiveDate,
    supplier: String,
    amount: Amount,
    #[serde(default)]
    category: String,
    #[serde(default)]
    unit: String,
    council_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        supplier: impl Into<String>,
        amount: impl Into<Amount>,
        council_id: impl Into<String>,
    ) -> Self {
        Self {
            date,
            supplier: supplier.into(),
            amount: amount.into(),
            category: String::new(),
            unit: String::new(),
            council_id: council_id.into(),
            reference: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.reference = if reference.trim().is_empty() {
            None
        } else {
            Some(reference)
        };
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    /// The normalised supplier identity used for every supplier grouping.
    pub fn supplier_key(&self) -> String {
        supplier_key(&self.supplier)
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn council_id(&self) -> &str {
        &self.council_id
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn financial_year(&self) -> FinancialYear {
        calendar::financial_year(self.date)
    }

    pub fn quarter(&self) -> u8 {
        calendar::quarter(self.date)
    }

    /// The textual value of a categorical or searchable column. Returns `None` for columns that
    /// are not text, or for an absent reference.
    pub fn text(&self, column: TransactionColumn) -> Option<Cow<'_, str>> {
        match column {
            TransactionColumn::Supplier => Some(Cow::Borrowed(&self.supplier)),
            TransactionColumn::Category => Some(Cow::Borrowed(&self.category)),
            TransactionColumn::Unit => Some(Cow::Borrowed(&self.unit)),
            TransactionColumn::CouncilId => Some(Cow::Borrowed(&self.council_id)),
            TransactionColumn::Reference => self.reference.as_deref().map(Cow::Borrowed),
            TransactionColumn::FinancialYear => {
                Some(Cow::Owned(self.financial_year().to_string()))
            }
            TransactionColumn::Date | TransactionColumn::Amount | TransactionColumn::Quarter => {
                None
            }
        }
    }
}

/// Builds a `Transaction` from canonical-schema cells, one column at a time.
///
/// Required fields are checked in `build`, so a record missing e.g. its supplier is rejected
/// rather than defaulted.
#[derive(Debug, Default, Clone)]
pub(crate) struct TransactionRecord {
    date: Option<NaiveDate>,
    supplier: Option<String>,
    amount: Option<Amount>,
    category: String,
    unit: String,
    council_id: Option<String>,
    reference: String,
}

impl TransactionRecord {
    pub(crate) fn set_with_header(&mut self, header: &str, value: &str) -> anyhow::Result<()> {
        let column = match TransactionColumn::from_header(header) {
            Ok(column) => column,
            // Extra columns in a publication are ignored.
            Err(_) => return Ok(()),
        };
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        match column {
            TransactionColumn::Date => {
                self.date = Some(
                    NaiveDate::parse_from_str(value, "%Y-%m-%d")
                        .with_context(|| format!("Invalid ISO-8601 date '{value}'"))?,
                )
            }
            TransactionColumn::Supplier => self.supplier = Some(value.to_string()),
            TransactionColumn::Amount => {
                self.amount = Some(
                    Amount::from_str(value)
                        .with_context(|| format!("Invalid amount '{value}'"))?,
                )
            }
            TransactionColumn::Category => self.category = value.to_string(),
            TransactionColumn::Unit => self.unit = value.to_string(),
            TransactionColumn::CouncilId => self.council_id = Some(value.to_string()),
            TransactionColumn::Reference => self.reference = value.to_string(),
            TransactionColumn::FinancialYear | TransactionColumn::Quarter => {
                // Derived columns are recomputed from the date, never trusted from input.
            }
        }
        Ok(())
    }

    pub(crate) fn build(self) -> anyhow::Result<Transaction> {
        let Some(date) = self.date else {
            bail!("Missing required field 'date'")
        };
        let Some(supplier) = self.supplier else {
            bail!("Missing required field 'supplier'")
        };
        let Some(amount) = self.amount else {
            bail!("Missing required field 'amount'")
        };
        let Some(council_id) = self.council_id else {
            bail!("Missing required field 'council_id'")
        };
        Ok(Transaction::new(date, supplier, amount, council_id)
            .with_category(self.category)
            .with_unit(self.unit)
            .with_reference(self.reference))
    }
}

/// The closed set of columns in the canonical transaction schema. Nothing outside this enum can
/// ever reach a compiled predicate.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionColumn {
    Date,
    Supplier,
    Amount,
    Category,
    Unit,
    CouncilId,
    Reference,
    /// Derived from `date`.
    FinancialYear,
    /// Derived from `date`.
    Quarter,
}

serde_plain::derive_display_from_serialize!(TransactionColumn);
serde_plain::derive_fromstr_from_deserialize!(TransactionColumn);

impl TransactionColumn {
    pub const ALL: [TransactionColumn; 9] = [
        TransactionColumn::Date,
        TransactionColumn::Supplier,
        TransactionColumn::Amount,
        TransactionColumn::Category,
        TransactionColumn::Unit,
        TransactionColumn::CouncilId,
        TransactionColumn::Reference,
        TransactionColumn::FinancialYear,
        TransactionColumn::Quarter,
    ];

    /// Columns that free-text search looks in.
    pub const SEARCHABLE: [TransactionColumn; 4] = [
        TransactionColumn::Supplier,
        TransactionColumn::Category,
        TransactionColumn::Unit,
        TransactionColumn::Reference,
    ];

    pub fn from_header(header: impl AsRef<str>) -> anyhow::Result<TransactionColumn> {
        let header_str = header.as_ref().trim();
        match header_str {
            DATE_STR => Ok(TransactionColumn::Date),
            SUPPLIER_STR => Ok(TransactionColumn::Supplier),
            AMOUNT_STR => Ok(TransactionColumn::Amount),
            CATEGORY_STR => Ok(TransactionColumn::Category),
            UNIT_STR => Ok(TransactionColumn::Unit),
            COUNCIL_ID_STR => Ok(TransactionColumn::CouncilId),
            REFERENCE_STR => Ok(TransactionColumn::Reference),
            FINANCIAL_YEAR_STR => Ok(TransactionColumn::FinancialYear),
            QUARTER_STR => Ok(TransactionColumn::Quarter),
            bad => bail!("Invalid transaction column name '{bad}'"),
        }
    }

    /// The column name used in headers and in compiled SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionColumn::Date => DATE_STR,
            TransactionColumn::Supplier => SUPPLIER_STR,
            TransactionColumn::Amount => AMOUNT_STR,
            TransactionColumn::Category => CATEGORY_STR,
            TransactionColumn::Unit => UNIT_STR,
            TransactionColumn::CouncilId => COUNCIL_ID_STR,
            TransactionColumn::Reference => REFERENCE_STR,
            TransactionColumn::FinancialYear => FINANCIAL_YEAR_STR,
            TransactionColumn::Quarter => QUARTER_STR,
        }
    }

    /// Whether the column holds discrete text values that can be faceted or grouped on.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            TransactionColumn::Supplier
                | TransactionColumn::Category
                | TransactionColumn::Unit
                | TransactionColumn::CouncilId
                | TransactionColumn::Reference
                | TransactionColumn::FinancialYear
        )
    }

    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            TransactionColumn::FinancialYear | TransactionColumn::Quarter
        )
    }
}

const DATE_STR: &str = "date";
const SUPPLIER_STR: &str = "supplier";
const AMOUNT_STR: &str = "amount";
const CATEGORY_STR: &str = "category";
const UNIT_STR: &str = "unit";
const COUNCIL_ID_STR: &str = "council_id";
const REFERENCE_STR: &str = "reference";
const FINANCIAL_YEAR_STR: &str = "financial_year";
const QUARTER_STR: &str = "quarter";

/// Legal-form suffixes dropped when matching supplier names.
const SUPPLIER_SUFFIXES: [&str; 5] = ["LIMITED", "LTD", "PLC", "LLP", "CO"];

/// Normalises a supplier name so that trivial spelling variants group together.
///
/// Upper-cases, replaces punctuation with spaces, collapses whitespace and strips trailing legal
/// suffixes such as `LTD` and `PLC`.
pub fn supplier_key(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '&' {
                c.to_ascii_uppercase()
            } else {
                ' '
            }
        })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 {
        match words.last() {
            Some(last) if SUPPLIER_SUFFIXES.contains(last) => {
                words.pop();
            }
            _ => break,
        }
    }
    words.join(" ")
}
