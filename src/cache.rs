//! An explicit cache of detector results.
//!
//! Entries are keyed by (entity, filter hash, detector) and expire after a fixed time to live.
//! When new data for an entity has been ingested, call `on_ingestion_complete` to drop
//! everything cached for it.

use crate::detect::{DetectorKind, DetectorReport};
use crate::filter::FilterSpec;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub entity: String,
    pub filter_hash: u64,
    pub detector: DetectorKind,
}

impl CacheKey {
    pub fn new(entity: impl Into<String>, filter: &FilterSpec, detector: DetectorKind) -> Self {
        Self {
            entity: entity.into(),
            filter_hash: filter.filter_hash(),
            detector,
        }
    }
}

#[derive(Debug)]
struct Entry {
    stored_at: Instant,
    report: DetectorReport,
}

/// Detector reports cached with a time to live. Share it behind an `Arc`.
#[derive(Debug)]
pub struct FindingsCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl FindingsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached report if it has not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<DetectorReport> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            trace!("Cache entry for {key:?} has expired");
            return None;
        }
        Some(entry.report.clone())
    }

    pub async fn insert(&self, key: CacheKey, report: DetectorReport) {
        let entry = Entry {
            stored_at: Instant::now(),
            report,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Drops every entry for `entity`. Returns how many were dropped.
    pub async fn invalidate_entity(&self, entity: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.entity != entity);
        before - entries.len()
    }

    /// Called by the ingestion layer once new data for `entity` is in the store.
    pub async fn on_ingestion_complete(&self, entity: &str) {
        let dropped = self.invalidate_entity(entity).await;
        debug!("Ingestion complete for {entity}, dropped {dropped} cached reports");
    }

    /// Removes expired entries.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
