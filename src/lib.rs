//! Analytics and anomaly detection over local-government spending transactions.
//!
//! Transactions in the canonical schema go in; findings come out. A typical run:
//!
//! ```no_run
//! # async fn run() -> council_spend_audit::Result<()> {
//! use council_spend_audit::engine::Analyzer;
//! use council_spend_audit::filter::{FilterSpec, Schema};
//! use council_spend_audit::ingest::{self, IngestOptions};
//! use council_spend_audit::AnalysisConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let transactions =
//!     ingest::read_file("spend.csv".as_ref(), None, &IngestOptions::default()).await?;
//! let schema = Schema::infer(&transactions);
//! let filter = FilterSpec::new().search("cleaning");
//! let report = Analyzer::new(AnalysisConfig::default())
//!     .analyze(&transactions, &schema, &filter, CancellationToken::new())
//!     .await?;
//! println!("{}", report.savings.total_potential);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod args;
pub mod cache;
pub mod calendar;
pub mod commands;
pub mod concentration;
mod config;
pub mod cross_entity;
pub mod detect;
pub mod engine;
mod error;
pub mod filter;
pub mod ingest;
pub mod model;
pub mod savings;
pub mod store;

#[cfg(test)]
mod test;

pub use config::{
    AnalysisConfig, ConsolidationConfig, ContractGrowthConfig, CrossEntityConfig, DuplicateConfig,
    Limits, SavingsRates, SpikeConfig, SplitConfig,
};
pub use error::{Error, ErrorType, Result};
