//! Findings: the structured output of the detectors.

use crate::calendar::FinancialYear;
use crate::model::{Amount, Transaction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How serious a finding is.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

serde_plain::derive_display_from_serialize!(Severity);
serde_plain::derive_fromstr_from_deserialize!(Severity);

/// The kind of a finding.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Duplicate,
    Spike,
    Split,
    Consolidation,
    ContractGrowth,
}

serde_plain::derive_display_from_serialize!(FindingType);
serde_plain::derive_fromstr_from_deserialize!(FindingType);

/// How sure the duplicate-payment heuristic is that a group is a genuine double payment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

serde_plain::derive_display_from_serialize!(Confidence);
serde_plain::derive_fromstr_from_deserialize!(Confidence);

/// A pointer back to the transaction a finding is based on.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub date: NaiveDate,
    pub supplier: String,
    pub amount: Amount,
    pub council_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl From<&Transaction> for TransactionRef {
    fn from(txn: &Transaction) -> Self {
        Self {
            date: txn.date(),
            supplier: txn.supplier().to_string(),
            amount: txn.amount(),
            council_id: txn.council_id().to_string(),
            reference: txn.reference().map(str::to_string),
        }
    }
}

/// What a finding is based on: transaction references and/or aggregate facts.
///
/// Transaction listings are capped; `total_transactions` keeps the uncapped count.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub transactions: Vec<TransactionRef>,
    pub total_transactions: usize,
    pub facts: BTreeMap<String, String>,
}

impl Evidence {
    /// Collects at most `cap` transaction references.
    pub fn from_transactions<'a>(
        transactions: impl IntoIterator<Item = &'a Transaction>,
        cap: usize,
    ) -> Self {
        let mut evidence = Evidence::default();
        for txn in transactions {
            if evidence.transactions.len() < cap {
                evidence.transactions.push(txn.into());
            }
            evidence.total_transactions += 1;
        }
        evidence
    }

    pub fn fact(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.facts.insert(key.into(), value.to_string());
        self
    }

    pub fn is_truncated(&self) -> bool {
        self.total_transactions > self.transactions.len()
    }
}

/// Detector-specific structured details. The tag doubles as the finding's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FindingDetails {
    Duplicate {
        supplier: String,
        amount: Amount,
        occurrence_count: usize,
        potential_overpayment: Amount,
        confidence: Confidence,
        first_date: NaiveDate,
        last_date: NaiveDate,
    },
    Spike {
        month: String,
        month_total: Amount,
        mean: f64,
        std_dev: f64,
        z_score: f64,
    },
    Split {
        supplier: String,
        iso_year: i32,
        iso_week: u32,
        threshold: Amount,
        payment_count: usize,
        total: Amount,
    },
    Consolidation {
        category: String,
        supplier_count: usize,
        category_spend: Amount,
        estimated_saving: Amount,
    },
    ContractGrowth {
        supplier: String,
        financial_year: FinancialYear,
        previous_spend: Amount,
        current_spend: Amount,
        growth_pct: f64,
        estimated_saving: Amount,
    },
}

impl FindingDetails {
    pub fn finding_type(&self) -> FindingType {
        match self {
            FindingDetails::Duplicate { .. } => FindingType::Duplicate,
            FindingDetails::Spike { .. } => FindingType::Spike,
            FindingDetails::Split { .. } => FindingType::Split,
            FindingDetails::Consolidation { .. } => FindingType::Consolidation,
            FindingDetails::ContractGrowth { .. } => FindingType::ContractGrowth,
        }
    }
}

/// A single flagged issue, ready to be rendered by a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// The money at stake: an overpayment, an excess over the mean, a payment total or an
    /// estimated saving depending on the finding type.
    pub monetary_value: Amount,
    pub evidence: Evidence,
    pub narrative: String,
    pub details: FindingDetails,
}

impl Finding {
    pub fn finding_type(&self) -> FindingType {
        self.details.finding_type()
    }
}
