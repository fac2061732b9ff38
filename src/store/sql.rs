use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ActiveValue::Set,
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    EntityTrait, QueryFilter, QueryOrder, Schema,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Collection, DocumentStore, StoreError};
use crate::entities::document;

/// Store backed by a single `documents` table through sea-orm.
#[derive(Debug, Clone)]
pub struct SqlDocumentStore {
    db: DatabaseConnection,
}

impl SqlDocumentStore {
    /// Connects to `url` and creates the `documents` table when missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(if url.starts_with("sqlite") { 1 } else { 10 })
            .connect_timeout(Duration::from_secs(30))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        info!("Connecting document store");
        let db = Database::connect(opt).await?;
        let store = Self { db };
        store.ensure_schema().await?;
        info!("Document store ready");
        Ok(store)
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(document::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        for mut index in schema.create_index_from_entity(document::Entity) {
            index.if_not_exists();
            self.db.execute(backend.build(&index)).await?;
        }
        debug!("documents table ensured");
        Ok(())
    }
}

/// `body.<field> = value` for a top-level string field, in the backend's
/// JSON dialect. Field and value are both bound as parameters.
fn body_field_eq(backend: DbBackend, field: &str, value: &str) -> SimpleExpr {
    match backend {
        DbBackend::Postgres => Expr::cust_with_values(
            "(body ->> ?) = ?",
            [field.to_owned(), value.to_owned()],
        ),
        DbBackend::Sqlite => Expr::cust_with_values(
            "json_extract(body, ?) = ?",
            [format!("$.{}", field), value.to_owned()],
        ),
        // MySQL
        _ => Expr::cust_with_values(
            "JSON_UNQUOTE(JSON_EXTRACT(body, ?)) = ?",
            [format!("$.{}", field), value.to_owned()],
        ),
    }
}

#[async_trait]
impl DocumentStore for SqlDocumentStore {
    fn backend_name(&self) -> &'static str {
        "sql"
    }

    async fn insert(
        &self,
        collection: Collection,
        id: Uuid,
        doc: Value,
    ) -> Result<(), StoreError> {
        let existing = document::Entity::find_by_id(id).one(&self.db).await?;
        if existing.is_some() {
            return Err(StoreError::Duplicate { collection, id });
        }

        let now = Utc::now();
        let model = document::ActiveModel {
            id: Set(id),
            collection: Set(collection.to_string()),
            body: Set(doc),
            created_at: Set(now),
            updated_at: Set(now),
        };
        document::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(document::Entity::find_by_id(id)
            .filter(document::Column::Collection.eq(collection.as_ref()))
            .one(&self.db)
            .await?
            .map(|row| row.body))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(document::Entity::find()
            .filter(document::Column::Collection.eq(collection.as_ref()))
            .order_by_asc(document::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| row.body)
            .collect())
    }

    async fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let backend = self.db.get_database_backend();
        Ok(document::Entity::find()
            .filter(document::Column::Collection.eq(collection.as_ref()))
            .filter(body_field_eq(backend, field, value))
            .order_by_asc(document::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| row.body)
            .collect())
    }

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        doc: Value,
    ) -> Result<u64, StoreError> {
        let result = document::Entity::update_many()
            .col_expr(document::Column::Body, Expr::value(doc))
            .col_expr(document::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(document::Column::Id.eq(id))
            .filter(document::Column::Collection.eq(collection.as_ref()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<u64, StoreError> {
        let result = document::Entity::delete_many()
            .filter(document::Column::Id.eq(id))
            .filter(document::Column::Collection.eq(collection.as_ref()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }
}
