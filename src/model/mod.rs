//! Types that represent the core data model, such as `Transaction` and `Finding`.
mod amount;
mod finding;
mod transaction;

pub use amount::{Amount, AmountError};
pub use finding::{
    Confidence, Evidence, Finding, FindingDetails, FindingType, Severity, TransactionRef,
};
pub(crate) use transaction::TransactionRecord;
pub use transaction::{supplier_key, Transaction, TransactionColumn};
