//! Command handlers for the spend-audit CLI.
//!
//! This module contains implementations for all CLI subcommands. Each handler loads its input,
//! calls into the library and returns an `Out` for `main` to print.

mod aggregate;
mod analyze;
mod compare;

use crate::args::InputArgs;
use crate::ingest;
use crate::model::Transaction;
use crate::Result;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use aggregate::aggregate;
pub use analyze::analyze;
pub use compare::compare;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to stdout.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            match serde_json::to_string_pretty(structure) {
                Ok(json) => println!("{json}"),
                Err(e) => debug!("Unable to serialize command output: {e}"),
            }
        }
    }
}

/// Reads the input file named on the command line.
async fn load(input: &InputArgs) -> Result<Vec<Transaction>> {
    ingest::read_file(input.file(), input.format(), &input.ingest_options()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_from_message() {
        let out: Out<Vec<u8>> = "done".into();
        assert_eq!(out.message(), "done");
        assert!(out.structure().is_none());
        let out = Out::new("with data", vec![1u8, 2]);
        assert_eq!(out.structure(), Some(&vec![1u8, 2]));
    }
}
