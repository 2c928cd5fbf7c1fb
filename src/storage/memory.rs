//! In-process record store with the same uniqueness rules as the SQL schema.
//!
//! Both tables are keyed by `record_id`. A one-shot failure can be armed
//! for either table so that error paths can be exercised without a
//! database.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use super::RecordStore;
use crate::domain::EventRecord;
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Tables {
    primary: BTreeMap<i64, EventRecord>,
    secondary: BTreeMap<i64, EventRecord>,
    fail_next_primary: Option<String>,
    fail_next_secondary: Option<String>,
}

/// Record store backed by in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in the primary table, ordered by `record_id`.
    pub async fn primary_rows(&self) -> Vec<EventRecord> {
        self.tables.read().await.primary.values().copied().collect()
    }

    /// Rows in the secondary table, ordered by `record_id`.
    pub async fn secondary_rows(&self) -> Vec<EventRecord> {
        self.tables.read().await.secondary.values().copied().collect()
    }

    /// Makes the next primary insert fail with a non-duplicate error.
    pub async fn fail_next_primary(&self, message: impl Into<String>) {
        self.tables.write().await.fail_next_primary = Some(message.into());
    }

    /// Makes the next secondary insert fail.
    pub async fn fail_next_secondary(&self, message: impl Into<String>) {
        self.tables.write().await.fail_next_secondary = Some(message.into());
    }
}

impl RecordStore for InMemoryStore {
    async fn insert_primary(&self, record: &EventRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(message) = tables.fail_next_primary.take() {
            return Err(StorageError::Backend(message));
        }
        if tables.primary.contains_key(&record.record_id) {
            return Err(StorageError::DuplicateKey {
                record_id: record.record_id,
            });
        }
        tables.primary.insert(record.record_id, *record);
        Ok(())
    }

    async fn insert_secondary(&self, record: &EventRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(message) = tables.fail_next_secondary.take() {
            return Err(StorageError::Backend(message));
        }
        if tables.secondary.contains_key(&record.record_id) {
            return Err(StorageError::Backend(format!(
                "record_id {} already present in skipped store",
                record.record_id
            )));
        }
        tables.secondary.insert(record.record_id, *record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_primary_insert_is_visible_once() {
        let store = InMemoryStore::new();
        let record = EventRecord::new(1, 1, 10);
        assert!(store.insert_primary(&record).await.is_ok());
        assert_eq!(store.primary_rows().await, vec![record]);
        assert!(store.secondary_rows().await.is_empty());
    }

    #[tokio::test]
    async fn colliding_primary_insert_is_duplicate_key() {
        let store = InMemoryStore::new();
        let _ = store.insert_primary(&EventRecord::new(1, 1, 10)).await;
        let err = store.insert_primary(&EventRecord::new(9, 1, 99)).await;
        assert!(matches!(err, Err(StorageError::DuplicateKey { record_id: 1 })));
        assert_eq!(store.primary_rows().await, vec![EventRecord::new(1, 1, 10)]);
    }

    #[tokio::test]
    async fn secondary_collision_is_not_duplicate_key() {
        let store = InMemoryStore::new();
        let record = EventRecord::new(1, 1, 10);
        assert!(store.insert_secondary(&record).await.is_ok());
        let err = store.insert_secondary(&record).await;
        assert!(matches!(err, Err(StorageError::Backend(_))));
        assert_eq!(store.secondary_rows().await.len(), 1);
    }

    #[tokio::test]
    async fn armed_failure_fires_once() {
        let store = InMemoryStore::new();
        store.fail_next_primary("connection reset").await;
        let record = EventRecord::new(1, 5, 50);
        assert!(matches!(
            store.insert_primary(&record).await,
            Err(StorageError::Backend(_))
        ));
        assert!(store.insert_primary(&record).await.is_ok());
    }
}
