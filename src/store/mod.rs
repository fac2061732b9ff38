//! Document storage for the workflow entities.
//!
//! Every entity is persisted as a JSON document in a named collection and
//! addressed by UUID. Backends only guarantee single-document writes; there
//! is no atomicity across documents or collections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod sql;

pub use memory::InMemoryStore;
pub use sql::SqlDocumentStore;

/// Named collections, one per entity kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Users,
    Restaurants,
    MenuItems,
    Riders,
    Carts,
    Orders,
    Deliveries,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("document {id} already exists in {collection}")]
    Duplicate { collection: Collection, id: Uuid },

    #[error("malformed document in {collection}: {message}")]
    Malformed {
        collection: Collection,
        message: String,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Raw document storage. Implementations must be safe to share across tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert(&self, collection: Collection, id: Uuid, doc: Value)
        -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError>;

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Documents whose top-level string `field` equals `value`.
    async fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError>;

    /// Overwrites an existing document. Returns the number of documents modified (0 or 1).
    async fn replace(&self, collection: Collection, id: Uuid, doc: Value)
        -> Result<u64, StoreError>;

    /// Returns the number of documents removed (0 or 1).
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// A typed entity that lives in one collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;

    /// Stamps `updated_at` before a write.
    fn touch(&mut self, now: DateTime<Utc>);
}

/// Typed access to one collection.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    fn encode(doc: &T) -> Result<Value, StoreError> {
        serde_json::to_value(doc).map_err(|e| StoreError::Malformed {
            collection: T::COLLECTION,
            message: e.to_string(),
        })
    }

    fn decode(value: Value) -> Result<T, StoreError> {
        serde_json::from_value(value).map_err(|e| StoreError::Malformed {
            collection: T::COLLECTION,
            message: e.to_string(),
        })
    }

    pub async fn insert(&self, doc: &T) -> Result<(), StoreError> {
        self.store
            .insert(T::COLLECTION, doc.id(), Self::encode(doc)?)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// All documents, newest first.
    pub async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        let mut docs = self
            .store
            .list(T::COLLECTION)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;
        docs.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(docs)
    }

    /// Documents whose string `field` equals `value`, newest first. Only the
    /// matching documents are fetched and decoded.
    pub async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<T>, StoreError> {
        let mut docs = self
            .store
            .find_by_field(T::COLLECTION, field, value)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;
        docs.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(docs)
    }

    /// Newest document whose string `field` equals `value`.
    pub async fn find_one_by_field(&self, field: &str, value: &str) -> Result<Option<T>, StoreError> {
        Ok(self.find_by_field(field, value).await?.into_iter().next())
    }

    /// Documents matching `predicate`, newest first.
    pub async fn find<P>(&self, predicate: P) -> Result<Vec<T>, StoreError>
    where
        P: Fn(&T) -> bool,
    {
        let mut docs = self.find_all().await?;
        docs.retain(|doc| predicate(doc));
        Ok(docs)
    }

    /// Writes `doc` over the stored version, stamping `updated_at` first.
    /// Returns the number of documents modified.
    pub async fn save(&self, doc: &mut T) -> Result<u64, StoreError> {
        doc.touch(Utc::now());
        self.store
            .replace(T::COLLECTION, doc.id(), Self::encode(doc)?)
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<u64, StoreError> {
        self.store.delete(T::COLLECTION, id).await
    }
}
