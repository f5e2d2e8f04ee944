use super::error::InfrastructureError;
use crate::domain::document_store::DocumentStore;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

// 外部ドキュメントストアの代わりにメモリ上へ保存する
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
    next_id: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.lock().await;
        collections.get(collection).and_then(|docs| docs.get(id)).cloned()
    }

    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().await;
        collections.get(collection).map_or(0, HashMap::len)
    }
}

fn as_object(document: Value) -> Result<Map<String, Value>, InfrastructureError> {
    match document {
        Value::Object(fields) => Ok(fields),
        other => Err(InfrastructureError::DocumentStoreError(format!(
            "documents must be JSON objects, got {}",
            other
        ))),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, document: Value) -> Result<String, InfrastructureError> {
        let fields = as_object(document)?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), Value::Object(fields));
        debug!(collection, %id, "document created");
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, document: Value) -> Result<(), InfrastructureError> {
        let fields = as_object(document)?;
        let mut collections = self.collections.lock().await;
        let existing = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(target) = existing {
            target.extend(fields);
        }
        debug!(collection, id, "document merged");
        Ok(())
    }
}
