//! The read-only boundary between the analytics core and wherever transactions are kept.
//!
//! The core never queries storage directly. It hands a store a validated `Predicate` and a row
//! limit, and a store that speaks SQL can use `Predicate::to_sql` to build a parameterised query.
//! `MemoryStore` is the reference implementation and is what the command line uses.

use crate::aggregate::{self, AggregationBucket, TimePeriod};
use crate::error::ErrorType;
use crate::filter::{Predicate, Schema};
use crate::model::{Transaction, TransactionColumn};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Read access to one or more councils' transactions.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// The council ids this store holds, sorted.
    async fn entities(&self) -> Result<Vec<String>>;

    /// The columns available for `entity`.
    async fn schema(&self, entity: &str) -> Result<Schema>;

    /// Transactions for `entity` matching `predicate`, in input order, at most `limit` of them.
    async fn fetch(
        &self,
        entity: &str,
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>>;

    /// Aggregates the matching transactions. Stores that can push grouping down to their engine
    /// should override this.
    async fn aggregate(
        &self,
        entity: &str,
        predicate: &Predicate,
        period: TimePeriod,
        group_by: Option<TransactionColumn>,
    ) -> Result<Vec<AggregationBucket>> {
        let transactions = self.fetch(entity, predicate, None).await?;
        Ok(aggregate::aggregate(&transactions, period, group_by))
    }
}

#[derive(Debug, Clone)]
struct Entity {
    schema: Schema,
    transactions: Vec<Transaction>,
}

/// Keeps transactions in memory, one entry per council.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<String, Entity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the data held for every council that appears in `transactions`. Returns the ids
    /// of the councils that were replaced, so that caches can be invalidated.
    ///
    /// The schema of each council is inferred from the data: a column that is blank in every row
    /// is treated as not published.
    pub async fn load(&self, transactions: Vec<Transaction>) -> Vec<String> {
        let mut by_council: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
        for txn in transactions {
            by_council
                .entry(txn.council_id().to_string())
                .or_default()
                .push(txn);
        }
        let mut entities = self.entities.write().await;
        let mut loaded = Vec::with_capacity(by_council.len());
        for (council_id, transactions) in by_council {
            debug!(
                "Loaded {} transactions for {}",
                transactions.len(),
                council_id
            );
            let schema = Schema::infer(&transactions);
            entities.insert(
                council_id.clone(),
                Entity {
                    schema,
                    transactions,
                },
            );
            loaded.push(council_id);
        }
        loaded
    }

    async fn with_entity<T>(&self, entity: &str, f: impl FnOnce(&Entity) -> T) -> Result<T> {
        let entities = self.entities.read().await;
        match entities.get(entity) {
            Some(e) => Ok(f(e)),
            None => Err(Error::new(
                ErrorType::Schema,
                anyhow::anyhow!("Unknown entity '{entity}'"),
            )),
        }
    }
}

#[async_trait::async_trait]
impl TransactionStore for MemoryStore {
    async fn entities(&self) -> Result<Vec<String>> {
        Ok(self.entities.read().await.keys().cloned().collect())
    }

    async fn schema(&self, entity: &str) -> Result<Schema> {
        self.with_entity(entity, |e| e.schema.clone()).await
    }

    async fn fetch(
        &self,
        entity: &str,
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        trace!("fetch {entity} limit {limit:?}");
        self.with_entity(entity, |e| {
            e.transactions
                .iter()
                .filter(|t| predicate.matches(t))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        })
        .await
    }
}
