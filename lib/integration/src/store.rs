//! Document store interface.
//!
//! Documents are JSON objects addressed by `(collection, key)`. Queries
//! match on top-level fields only.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A document together with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Key within the collection.
    pub key: String,
    /// Document body.
    pub document: JsonValue,
}

/// Filter over top-level document fields.
///
/// All conditions must hold for a document to match. An empty filter
/// matches every document in the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Fields that must equal the given value.
    pub equals: Vec<(String, JsonValue)>,
    /// String fields that must fall in an inclusive range.
    pub ranges: Vec<FieldRange>,
}

/// Inclusive range over a string field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRange {
    pub field: String,
    pub from: String,
    pub to: String,
}

impl DocumentFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// Requires string `field` to be within `[from, to]`.
    ///
    /// ISO dates compare correctly as strings, which is what the weekly
    /// aggregation relies on.
    #[must_use]
    pub fn between(
        mut self,
        field: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.ranges.push(FieldRange {
            field: field.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Returns true if the document satisfies every condition.
    #[must_use]
    pub fn matches(&self, document: &JsonValue) -> bool {
        let equal = self
            .equals
            .iter()
            .all(|(field, value)| document.get(field) == Some(value));
        let in_range = self.ranges.iter().all(|range| {
            document
                .get(&range.field)
                .and_then(JsonValue::as_str)
                .is_some_and(|v| range.from.as_str() <= v && v <= range.to.as_str())
        });
        equal && in_range
    }
}

/// Trait for document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonValue>, StoreError>;

    /// Inserts or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn put(&self, collection: &str, key: &str, document: JsonValue)
    -> Result<(), StoreError>;

    /// Inserts a document only if the key is unused.
    ///
    /// Returns `true` if this call inserted the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn put_if_absent(
        &self,
        collection: &str,
        key: &str,
        document: JsonValue,
    ) -> Result<bool, StoreError>;

    /// Returns all documents matching the filter, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn query(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

/// Document store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, JsonValue>>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: JsonValue,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        collection: &str,
        key: &str,
        document: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(key) {
            return Ok(false);
        }
        docs.insert(key.to_string(), document);
        Ok(true)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(key, doc)| StoredDocument {
                key: key.clone(),
                document: doc.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryDocumentStore::new();
        store
            .put("plans", "u1:2024-06-03", json!({"energy": 3}))
            .await
            .expect("put");

        let doc = store.get("plans", "u1:2024-06-03").await.expect("get");
        assert_eq!(doc, Some(json!({"energy": 3})));
        assert_eq!(store.get("plans", "missing").await.expect("get"), None);
        assert_eq!(store.count("plans").await, 1);
    }

    #[tokio::test]
    async fn put_if_absent_keeps_first_write() {
        let store = InMemoryDocumentStore::new();
        assert!(store.put_if_absent("c", "k", json!(1)).await.expect("first"));
        assert!(!store.put_if_absent("c", "k", json!(2)).await.expect("second"));
        assert_eq!(store.get("c", "k").await.expect("get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn query_filters_by_equality_and_range() {
        let store = InMemoryDocumentStore::new();
        for (key, user, date) in [
            ("a", "u1", "2024-06-01"),
            ("b", "u1", "2024-06-05"),
            ("c", "u1", "2024-06-12"),
            ("d", "u2", "2024-06-05"),
        ] {
            store
                .put("reflections", key, json!({"user_id": user, "date": date}))
                .await
                .expect("put");
        }

        let filter = DocumentFilter::new()
            .eq("user_id", "u1")
            .between("date", "2024-06-01", "2024-06-07");
        let found = store.query("reflections", &filter).await.expect("query");
        let keys: Vec<_> = found.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn query_on_missing_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        let found = store
            .query("nothing", &DocumentFilter::new())
            .await
            .expect("query");
        assert!(found.is_empty());
    }

    #[test]
    fn range_requires_string_field() {
        let filter = DocumentFilter::new().between("date", "2024-01-01", "2024-12-31");
        assert!(!filter.matches(&json!({"date": 20240101})));
        assert!(!filter.matches(&json!({})));
        assert!(filter.matches(&json!({"date": "2024-06-01"})));
    }
}
