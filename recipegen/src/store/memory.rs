//! In-memory gateways.
//!
//! [`InMemoryStore`] checks record invariants on every write, so a pipeline
//! bug surfaces as a [`StoreError::Constraint`] instead of a bad record.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::core::{AccountId, ContentRecord, EncodedBody, HistoryEntry, HistoryId, RecordId, TagId};
use crate::errors::{ObjectStorageError, StoreError};

use super::gateway::{ObjectStorage, PersistenceGateway};

/// A write operation that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `create_draft`.
    CreateDraft,
    /// `update_core_fields`.
    CoreFields,
    /// `find_or_create_tag` and `replace_tag_associations`.
    Tags,
    /// `update_image_location`.
    ImageLocation,
    /// `set_completion_flag`.
    Completion,
    /// `reset_for_refinement`.
    Reset,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<RecordId, ContentRecord>,
    histories: HashMap<HistoryId, Vec<HistoryEntry>>,
    tags_by_name: HashMap<String, TagId>,
    next_record: u64,
    next_tag: u64,
    completion_writes: usize,
}

/// A process-local data store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    failing: RwLock<HashSet<StoreOp>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `op` fail with a backend error.
    pub fn fail_on(&self, op: StoreOp) {
        self.failing.write().insert(op);
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Returns a snapshot of a record.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<ContentRecord> {
        self.state.lock().records.get(&id).cloned()
    }

    /// Returns the history entries of a record.
    #[must_use]
    pub fn history(&self, id: RecordId) -> Vec<HistoryEntry> {
        let state = self.state.lock();
        state
            .records
            .get(&id)
            .and_then(|r| state.histories.get(&r.history))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the sorted tag names associated with a record.
    #[must_use]
    pub fn tag_names(&self, id: RecordId) -> Vec<String> {
        let state = self.state.lock();
        let Some(record) = state.records.get(&id) else {
            return Vec::new();
        };
        let mut names: Vec<String> = state
            .tags_by_name
            .iter()
            .filter(|(_, tag)| record.tags.contains(tag))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns how many distinct tags exist.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.state.lock().tags_by_name.len()
    }

    /// Returns how many times the completion flag was set to true.
    #[must_use]
    pub fn completion_writes(&self) -> usize {
        self.state.lock().completion_writes
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.failing.read().contains(&op) {
            Err(StoreError::Backend(format!("injected failure on {op:?}")))
        } else {
            Ok(())
        }
    }
}

fn record_mut(state: &mut State, id: RecordId) -> Result<&mut ContentRecord, StoreError> {
    state
        .records
        .get_mut(&id)
        .ok_or(StoreError::RecordNotFound(id.get()))
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn create_draft(&self, owner: AccountId, prompt: &str) -> Result<RecordId, StoreError> {
        self.check(StoreOp::CreateDraft)?;
        let mut state = self.state.lock();
        state.next_record += 1;
        let id = RecordId(state.next_record);
        let history = HistoryId(state.next_record);
        state.histories.insert(history, Vec::new());
        state
            .records
            .insert(id, ContentRecord::draft(id, owner, prompt, history));
        Ok(id)
    }

    async fn update_core_fields(
        &self,
        record: RecordId,
        title: &str,
        body: &EncodedBody,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::CoreFields)?;
        if title.trim().is_empty() || body.is_empty() {
            return Err(StoreError::Constraint(
                "title and body must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let stored = record_mut(&mut state, record)?;
        if let Some(existing) = &stored.body {
            if existing.version != body.version {
                return Err(StoreError::Constraint(format!(
                    "body format version is immutable ({} -> {})",
                    existing.version, body.version
                )));
            }
        }
        stored.title = Some(title.to_string());
        stored.body = Some(body.clone());
        let history = stored.history;
        state.histories.entry(history).or_default().push(entry.clone());
        Ok(())
    }

    async fn replace_tag_associations(&self, record: RecordId, tags: &[TagId]) -> Result<(), StoreError> {
        self.check(StoreOp::Tags)?;
        let mut state = self.state.lock();
        let stored = record_mut(&mut state, record)?;
        let mut unique = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(tag) {
                unique.push(*tag);
            }
        }
        stored.tags = unique;
        Ok(())
    }

    async fn update_image_location(&self, record: RecordId, location: &str) -> Result<(), StoreError> {
        self.check(StoreOp::ImageLocation)?;
        if location.is_empty() {
            return Err(StoreError::Constraint("image location must not be empty".to_string()));
        }
        let mut state = self.state.lock();
        record_mut(&mut state, record)?.image_location = Some(location.to_string());
        Ok(())
    }

    async fn reset_for_refinement(&self, record: RecordId) -> Result<(), StoreError> {
        self.check(StoreOp::Reset)?;
        let mut state = self.state.lock();
        let stored = record_mut(&mut state, record)?;
        stored.completed = false;
        stored.image_location = None;
        Ok(())
    }

    async fn set_completion_flag(&self, record: RecordId, completed: bool) -> Result<(), StoreError> {
        self.check(StoreOp::Completion)?;
        let mut state = self.state.lock();
        let stored = record_mut(&mut state, record)?;
        if completed && !stored.is_fully_populated() {
            return Err(StoreError::Constraint(
                "cannot complete a record without body and image".to_string(),
            ));
        }
        stored.completed = completed;
        if completed {
            state.completion_writes += 1;
        }
        Ok(())
    }

    async fn find_or_create_tag(&self, normalized: &str) -> Result<TagId, StoreError> {
        self.check(StoreOp::Tags)?;
        let mut state = self.state.lock();
        if let Some(id) = state.tags_by_name.get(normalized) {
            return Ok(*id);
        }
        state.next_tag += 1;
        let id = TagId(state.next_tag);
        state.tags_by_name.insert(normalized.to_string(), id);
        Ok(id)
    }

    async fn load_history(&self, record: RecordId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.lock();
        let stored = state
            .records
            .get(&record)
            .ok_or(StoreError::RecordNotFound(record.get()))?;
        Ok(state.histories.get(&stored.history).cloned().unwrap_or_default())
    }

    async fn get_record(&self, record: RecordId) -> Result<ContentRecord, StoreError> {
        self.record(record).ok_or(StoreError::RecordNotFound(record.get()))
    }
}

/// Object storage that keeps images in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    failing: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
}

impl InMemoryObjectStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent upload fail.
    pub fn fail_uploads(&self, failing: bool) {
        *self.failing.write() = failing;
    }

    /// Makes every subsequent upload take `delay` before it lands.
    pub fn set_upload_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Returns the stored bytes for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).cloned()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ObjectStorageError> {
        if key.is_empty() {
            return Err(ObjectStorageError::InvalidKey(key.to_string()));
        }
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing.read() {
            return Err(ObjectStorageError::UploadFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.objects.write().insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }
}
