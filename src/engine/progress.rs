// Construction progress store — per-step records with upsert semantics, persisted as one blob.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::PROGRESS_KEY;
use crate::error::EngineError;
use crate::storage::traits::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructionProgressRecord {
    pub step_index: u32,
    pub completed: bool,
    #[serde(default)]
    pub notes: String,
    /// Set when the record is created; never changes afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Set on the first completion only. Un-completing a step keeps it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
}

impl ConstructionProgressRecord {
    fn started(step_index: u32, now: DateTime<Utc>) -> Self {
        Self {
            step_index,
            completed: false,
            notes: String::new(),
            start_date: Some(now),
            completion_date: None,
        }
    }
}

/// Progress records keyed by step index.
///
/// Stored as a JSON list so the persisted format stays a plain array of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Vec<ConstructionProgressRecord>",
    into = "Vec<ConstructionProgressRecord>"
)]
pub struct ProgressCollection {
    records: BTreeMap<u32, ConstructionProgressRecord>,
}

impl ProgressCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step_index: u32) -> Option<&ConstructionProgressRecord> {
        self.records.get(&step_index)
    }

    /// Records in step order.
    pub fn iter(&self) -> impl Iterator<Item = &ConstructionProgressRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.records.values().filter(|r| r.completed).count()
    }

    /// Insert or replace the record for its step index.
    pub fn insert(&mut self, record: ConstructionProgressRecord) {
        self.records.insert(record.step_index, record);
    }

    fn find_or_start(&mut self, step_index: u32, now: DateTime<Utc>) -> &mut ConstructionProgressRecord {
        self.records
            .entry(step_index)
            .or_insert_with(|| ConstructionProgressRecord::started(step_index, now))
    }

    /// Set `completed`; stamp `completion_date` only if it was never set.
    pub fn upsert_completion(
        &mut self,
        step_index: u32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> &ConstructionProgressRecord {
        let record = self.find_or_start(step_index, now);
        record.completed = completed;
        if completed && record.completion_date.is_none() {
            record.completion_date = Some(now);
        }
        record
    }

    /// Replace the notes only.
    pub fn upsert_notes(
        &mut self,
        step_index: u32,
        notes: &str,
        now: DateTime<Utc>,
    ) -> &ConstructionProgressRecord {
        let record = self.find_or_start(step_index, now);
        record.notes = notes.to_string();
        record
    }
}

impl From<Vec<ConstructionProgressRecord>> for ProgressCollection {
    fn from(list: Vec<ConstructionProgressRecord>) -> Self {
        let mut records = BTreeMap::new();
        for record in list {
            if records.contains_key(&record.step_index) {
                warn!(
                    "duplicate progress record for step {}, keeping the first",
                    record.step_index
                );
                continue;
            }
            records.insert(record.step_index, record);
        }
        Self { records }
    }
}

impl From<ProgressCollection> for Vec<ConstructionProgressRecord> {
    fn from(collection: ProgressCollection) -> Self {
        collection.records.into_values().collect()
    }
}

impl FromIterator<ConstructionProgressRecord> for ProgressCollection {
    fn from_iter<I: IntoIterator<Item = ConstructionProgressRecord>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

/// Result of an upsert: the record as it now stands and whether it reached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub record: ConstructionProgressRecord,
    pub persisted: bool,
}

/// Durable progress tracking for a single local writer.
///
/// Every upsert is read-current, mutate, save-whole-collection. There is no
/// merging between overlapping writers: the last save wins.
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<ProgressCollection>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ProgressStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            current: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Read the persisted collection. Missing or unreadable data yields an empty collection.
    ///
    /// Seeds the in-memory state on first use but never replaces it: after a failed
    /// save the unsaved collection stays current until a later save succeeds.
    pub async fn load(&self) -> ProgressCollection {
        match self.read_persisted().await {
            Ok(collection) => {
                let mut current = self.current.lock();
                if current.is_none() {
                    *current = Some(collection.clone());
                }
                collection
            }
            Err(e) => {
                warn!("error loading progress: {}", e);
                ProgressCollection::new()
            }
        }
    }

    /// A corrupt blob reads as empty; only a storage failure is an error.
    async fn read_persisted(&self) -> anyhow::Result<ProgressCollection> {
        let collection = match self.kv.get(PROGRESS_KEY).await? {
            Some(raw) => serde_json::from_str::<ProgressCollection>(&raw).unwrap_or_else(|e| {
                warn!("discarding unreadable progress data: {}", e);
                ProgressCollection::new()
            }),
            None => ProgressCollection::new(),
        };
        debug!("read {} progress records", collection.len());
        Ok(collection)
    }

    /// The in-memory collection, reading storage only if nothing is held yet.
    async fn current_or_read(&self) -> anyhow::Result<ProgressCollection> {
        let cached = self.current.lock().clone();
        if let Some(collection) = cached {
            return Ok(collection);
        }
        let collection = self.read_persisted().await?;
        Ok(self.current.lock().get_or_insert(collection).clone())
    }

    /// Overwrite the persisted collection. Returns `false` if the write failed; the
    /// collection is still kept in memory as the current state.
    pub async fn save(&self, collection: ProgressCollection) -> bool {
        let _writer = self.write_lock.lock().await;
        self.save_locked(collection).await
    }

    async fn save_locked(&self, collection: ProgressCollection) -> bool {
        let serialized = serde_json::to_string(&collection);
        *self.current.lock() = Some(collection);

        let result = match serialized {
            Ok(json) => self.kv.set(PROGRESS_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                let err = EngineError::PersistenceWrite {
                    key: PROGRESS_KEY.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
                false
            }
        }
    }

    /// The in-memory collection, loading it from storage on first use.
    pub async fn snapshot(&self) -> ProgressCollection {
        match self.current_or_read().await {
            Ok(collection) => collection,
            Err(e) => {
                warn!("error loading progress: {}", e);
                ProgressCollection::new()
            }
        }
    }

    pub async fn get(&self, step_index: u32) -> Option<ConstructionProgressRecord> {
        self.snapshot().await.get(step_index).cloned()
    }

    pub async fn upsert_completion(&self, step_index: u32, completed: bool) -> ProgressUpdate {
        let now = self.clock.now();
        self.update(|collection| collection.upsert_completion(step_index, completed, now).clone())
            .await
    }

    pub async fn upsert_notes(&self, step_index: u32, notes: &str) -> ProgressUpdate {
        let now = self.clock.now();
        self.update(|collection| collection.upsert_notes(step_index, notes, now).clone())
            .await
    }

    async fn update<F>(&self, mutate: F) -> ProgressUpdate
    where
        F: FnOnce(&mut ProgressCollection) -> ConstructionProgressRecord,
    {
        let _writer = self.write_lock.lock().await;
        let mut collection = match self.current_or_read().await {
            Ok(collection) => collection,
            Err(e) => {
                // Saving now would overwrite records we could not read.
                warn!("progress storage unreadable, update not saved: {}", e);
                let record = mutate(&mut ProgressCollection::new());
                return ProgressUpdate {
                    record,
                    persisted: false,
                };
            }
        };
        let record = mutate(&mut collection);
        let persisted = self.save_locked(collection).await;
        debug!(
            "step {} updated: completed={} persisted={}",
            record.step_index, record.completed, persisted
        );
        ProgressUpdate { record, persisted }
    }

    /// Remove all persisted progress. Returns `false` if storage refused.
    pub async fn clear(&self) -> bool {
        let _writer = self.write_lock.lock().await;
        *self.current.lock() = Some(ProgressCollection::new());
        match self.kv.remove(PROGRESS_KEY).await {
            Ok(()) => true,
            Err(e) => {
                warn!("error clearing progress: {}", e);
                false
            }
        }
    }

    /// Pretty-printed current progress, or `None` when there is none.
    pub async fn export_json(&self) -> Option<String> {
        let collection = self.snapshot().await;
        if collection.is_empty() {
            return None;
        }
        match serde_json::to_string_pretty(&collection) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("error exporting progress: {}", e);
                None
            }
        }
    }
}
