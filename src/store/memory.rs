use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use uuid::Uuid;

use super::{Collection, DocumentStore, StoreError};

/// Process-local store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<(Collection, Uuid), Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(
        &self,
        collection: Collection,
        id: Uuid,
        doc: Value,
    ) -> Result<(), StoreError> {
        match self.documents.entry((collection, id)) {
            Entry::Occupied(_) => Err(StoreError::Duplicate { collection, id }),
            Entry::Vacant(slot) => {
                slot.insert(doc);
                Ok(())
            }
        }
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self
            .documents
            .get(&(collection, id))
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| {
                entry.key().0 == collection
                    && entry.value().get(field).and_then(Value::as_str) == Some(value)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        doc: Value,
    ) -> Result<u64, StoreError> {
        match self.documents.get_mut(&(collection, id)) {
            Some(mut entry) => {
                *entry = doc;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<u64, StoreError> {
        Ok(self.documents.remove(&(collection, id)).map_or(0, |_| 1))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
