//! Keyed JSON documents in PostgreSQL.

use super::is_connection_error;
use async_trait::async_trait;
use flowmentor_integration::{DocumentFilter, DocumentStore, StoreError, StoredDocument};
use serde_json::{Map, Value as JsonValue};
use sqlx::{FromRow, PgPool};

/// Row type for document queries.
#[derive(FromRow)]
struct DocumentRow {
    key: String,
    document: JsonValue,
}

fn store_error(collection: &str, operation: &'static str, e: sqlx::Error) -> StoreError {
    if is_connection_error(&e) {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        StoreError::OperationFailed {
            collection: collection.to_string(),
            operation,
            reason: e.to_string(),
        }
    }
}

/// Builds the containment object for the equality part of a filter.
///
/// Range conditions are left to [`DocumentFilter::matches`].
fn containment(filter: &DocumentFilter) -> JsonValue {
    let fields: Map<String, JsonValue> = filter
        .equals
        .iter()
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    JsonValue::Object(fields)
}

/// Document store over the `documents` table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let row: Option<(JsonValue,)> = sqlx::query_as(
            r#"
            SELECT document
            FROM documents
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error(collection, "get", e))?;

        Ok(row.map(|(document,)| document))
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: JsonValue,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, document, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (collection, key)
            DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(collection, "put", e))?;

        Ok(())
    }

    async fn put_if_absent(
        &self,
        collection: &str,
        key: &str,
        document: JsonValue,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, key, document, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (collection, key) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(collection, "put_if_absent", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT key, document
            FROM documents
            WHERE collection = $1 AND document @> $2
            ORDER BY key ASC
            "#,
        )
        .bind(collection)
        .bind(containment(filter))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error(collection, "query", e))?;

        Ok(rows
            .into_iter()
            .filter(|row| filter.matches(&row.document))
            .map(|row| StoredDocument {
                key: row.key,
                document: row.document,
            })
            .collect())
    }
}
