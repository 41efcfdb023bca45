//! Data store and object storage contracts.

use async_trait::async_trait;

use crate::core::{AccountId, ContentRecord, EncodedBody, HistoryEntry, RecordId, TagId};
use crate::errors::{ObjectStorageError, StoreError};

/// The minimal data-store surface a generation run needs.
///
/// Implementations serialize writes to a record and make
/// [`PersistenceGateway::update_core_fields`] a single transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Creates an empty, incomplete record for `owner`.
    async fn create_draft(&self, owner: AccountId, prompt: &str) -> Result<RecordId, StoreError>;

    /// Writes title and body and appends `entry`, atomically.
    async fn update_core_fields(
        &self,
        record: RecordId,
        title: &str,
        body: &EncodedBody,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Replaces the record's full tag set.
    async fn replace_tag_associations(&self, record: RecordId, tags: &[TagId]) -> Result<(), StoreError>;

    /// Records where the image was stored.
    async fn update_image_location(&self, record: RecordId, location: &str) -> Result<(), StoreError>;

    /// Clears the completion flag and the image location together, before a
    /// refinement replaces the record's content.
    async fn reset_for_refinement(&self, record: RecordId) -> Result<(), StoreError>;

    /// Sets the completion flag.
    async fn set_completion_flag(&self, record: RecordId, completed: bool) -> Result<(), StoreError>;

    /// Returns the tag with this normalized name, creating it if absent.
    async fn find_or_create_tag(&self, normalized: &str) -> Result<TagId, StoreError>;

    /// Returns the record's history, oldest first.
    async fn load_history(&self, record: RecordId) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Fetches a record.
    async fn get_record(&self, record: RecordId) -> Result<ContentRecord, StoreError>;
}

/// Stores generated images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns a retrievable location.
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ObjectStorageError>;
}

/// Deterministic object key for a record's image.
#[must_use]
pub fn image_key(record: RecordId) -> String {
    format!("recipes/{record}/images/recipe_image_{record}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_key_is_deterministic() {
        assert_eq!(image_key(RecordId(42)), "recipes/42/images/recipe_image_42.jpg");
        assert_eq!(image_key(RecordId(42)), image_key(RecordId(42)));
    }
}
