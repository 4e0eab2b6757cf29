//! Supplier concentration, measured with the Herfindahl-Hirschman Index.
//!
//! Shares are in percentage points, so a single supplier taking all the spend scores 10,000 and
//! a hundred equal suppliers score 100.

use crate::aggregate::group::{self, Groups};
use crate::model::{Amount, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MODERATE_FROM: f64 = 1500.0;
const HIGH_ABOVE: f64 = 2500.0;

/// How concentrated spend is.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationLevel {
    /// HHI below 1,500.
    Low,
    /// HHI from 1,500 to 2,500 inclusive.
    Moderate,
    /// HHI above 2,500.
    High,
}

serde_plain::derive_display_from_serialize!(ConcentrationLevel);
serde_plain::derive_fromstr_from_deserialize!(ConcentrationLevel);

impl ConcentrationLevel {
    pub fn classify(hhi: f64) -> Self {
        if hhi < MODERATE_FROM {
            ConcentrationLevel::Low
        } else if hhi <= HIGH_ABOVE {
            ConcentrationLevel::Moderate
        } else {
            ConcentrationLevel::High
        }
    }
}

/// One supplier's part of the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierShare {
    pub supplier: String,
    pub total: Amount,
    /// Percentage of the total, 0 to 100.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationProfile {
    /// Largest first.
    pub suppliers: Vec<SupplierShare>,
    pub total: Amount,
    pub hhi: f64,
    pub level: ConcentrationLevel,
    pub top5_share: f64,
    pub top10_share: f64,
}

impl ConcentrationProfile {
    /// Profiles supplier concentration across `transactions`.
    ///
    /// Only suppliers with positive net spend take part. Returns `None` when there are none,
    /// since shares of a zero total are meaningless.
    pub fn analyze(transactions: &[Transaction]) -> Option<Self> {
        let groups = Groups::by(transactions, Transaction::supplier_key);
        let mut totals: Vec<(String, Amount)> = groups
            .iter()
            .map(|(_, members)| (members[0].supplier().to_string(), group::total(members)))
            .filter(|(_, total)| total.is_positive())
            .collect();
        let total: Amount = totals.iter().map(|(_, t)| *t).sum();
        if !total.is_positive() {
            return None;
        }
        totals.sort_by(|a, b| b.1.cmp(&a.1));

        let grand = total.to_f64();
        let suppliers: Vec<SupplierShare> = totals
            .into_iter()
            .map(|(supplier, amount)| SupplierShare {
                supplier,
                total: amount,
                share: amount.to_f64() / grand * 100.0,
            })
            .collect();
        let hhi = suppliers.iter().map(|s| s.share * s.share).sum::<f64>();
        let top = |n: usize| suppliers.iter().take(n).map(|s| s.share).sum::<f64>();
        let top5_share = top(5);
        let top10_share = top(10);
        let level = ConcentrationLevel::classify(hhi);
        debug!(
            "HHI {:.0} ({}) across {} suppliers",
            hhi,
            level,
            suppliers.len()
        );
        Some(Self {
            suppliers,
            total,
            hhi,
            level,
            top5_share,
            top10_share,
        })
    }
}
