//! Deduplicating batch writer
//!
//! A fetched page is diffed against the store in one existence lookup and the
//! resulting inserts and updates are committed in one transaction. A batch is
//! never partially written; failed attempts are retried as a whole.

use crate::crawler::RawRepositoryRecord;
use crate::storage::traits::{RepositoryStore, StorageError, StorageResult};
use crate::storage::PersistedRecord;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Counts of what happened to each record of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Already stored with the same star count, or a duplicate inside the batch
    pub unchanged: usize,
}

impl UpsertSummary {
    /// Rows actually written
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Rows to write for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertPlan {
    pub inserts: Vec<PersistedRecord>,
    pub updates: Vec<PersistedRecord>,
    pub unchanged: usize,
}

impl UpsertPlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }

    pub fn summary(&self) -> UpsertSummary {
        UpsertSummary {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            unchanged: self.unchanged,
        }
    }
}

/// Diffs incoming records against the stored ones
///
/// Unknown ids become inserts, known ids with a different star count become
/// updates, and everything else is left alone, including its
/// `last_crawled_at`. When an id appears more than once in `records` only the
/// first occurrence is considered.
pub fn plan_upsert(
    records: &[RawRepositoryRecord],
    existing: &HashMap<String, PersistedRecord>,
    now: DateTime<Utc>,
) -> UpsertPlan {
    let mut plan = UpsertPlan::default();
    let mut seen = HashSet::with_capacity(records.len());

    for record in records {
        if !seen.insert(record.id.as_str()) {
            plan.unchanged += 1;
            continue;
        }

        let row = PersistedRecord {
            id: record.id.clone(),
            name: record.name.clone(),
            star_count: record.star_count,
            updated_at: record.updated_at,
            last_crawled_at: now,
        };

        match existing.get(&record.id) {
            None => plan.inserts.push(row),
            Some(stored) if stored.star_count != record.star_count => plan.updates.push(row),
            Some(_) => plan.unchanged += 1,
        }
    }

    plan
}

/// Writes fetched pages into a shared store
pub struct BatchUpsertWriter<S> {
    store: Arc<Mutex<S>>,
    max_retries: u32,
}

impl<S> BatchUpsertWriter<S>
where
    S: RepositoryStore,
{
    /// Creates a writer
    ///
    /// # Arguments
    ///
    /// * `store` - Store shared with every other writer of the run
    /// * `max_retries` - Attempts per batch before giving up (at least one is made)
    pub fn new(store: Arc<Mutex<S>>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries: max_retries.max(1),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Upserts one page of records, stamping changed rows with the current time
    pub fn write_batch(&self, records: &[RawRepositoryRecord]) -> StorageResult<UpsertSummary> {
        self.write_batch_at(records, Utc::now())
    }

    /// Upserts one page of records, stamping changed rows with `now`
    ///
    /// # Returns
    ///
    /// * `Ok(UpsertSummary)` - The batch was committed (or had nothing to write)
    /// * `Err(StorageError)` - Every attempt failed; nothing from this batch was written
    pub fn write_batch_at(
        &self,
        records: &[RawRepositoryRecord],
        now: DateTime<Utc>,
    ) -> StorageResult<UpsertSummary> {
        if records.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let mut ids: Vec<String> = Vec::with_capacity(records.len());
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if seen.insert(record.id.as_str()) {
                ids.push(record.id.clone());
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_write(&ids, records, now) {
                Ok(summary) => return Ok(summary),
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(
                        "Batch of {} records failed (attempt {}/{}): {}",
                        records.len(),
                        attempt,
                        self.max_retries,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_write(
        &self,
        ids: &[String],
        records: &[RawRepositoryRecord],
        now: DateTime<Utc>,
    ) -> StorageResult<UpsertSummary> {
        let mut store = self.store.lock().map_err(|_| StorageError::LockPoisoned)?;

        let existing = store.find_existing(ids)?;
        let plan = plan_upsert(records, &existing, now);
        if !plan.is_empty() {
            store.apply_changes(&plan.inserts, &plan.updates)?;
        }

        tracing::debug!(
            "Batch committed: {} inserted, {} updated, {} unchanged",
            plan.inserts.len(),
            plan.updates.len(),
            plan.unchanged
        );

        Ok(plan.summary())
    }
}
