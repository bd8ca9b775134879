use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde_json::Value;

use offsetting_protocol::ContentRef;

use crate::store::ContentStore;
use crate::StorageError;

/// In-process content store keyed by CIDv0 (sha2-256) of the JSON bytes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, content_ref: &ContentRef) -> Option<Value> {
        self.documents().get(content_ref.as_str()).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make uploads fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Content reference a document would be stored under.
    pub fn content_ref_for(document: &Value) -> Result<ContentRef, StorageError> {
        let bytes = serde_json::to_vec(document).map_err(|e| StorageError::Document(e.to_string()))?;
        let cid = Cid::new_v0(Code::Sha2_256.digest(&bytes))
            .map_err(|e| StorageError::Document(e.to_string()))?;
        Ok(ContentRef::new(cid.to_string()))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, document: &Value) -> Result<ContentRef, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connect("memory store is unavailable".into()));
        }
        let content_ref = Self::content_ref_for(document)?;
        self.documents()
            .insert(content_ref.as_str().to_string(), document.clone());
        Ok(content_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_is_content_addressed() {
        let store = MemoryStore::new();
        let a = store.put(&json!({"geo": "1, 2", "kwh": 3.0})).await.unwrap();
        let b = store.put(&json!({"kwh": 3.0, "geo": "1, 2"})).await.unwrap();
        let c = store.put(&json!({"geo": "1, 2", "kwh": 4.0})).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("Qm"));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.put(&json!({"a": 1})).await,
            Err(StorageError::Connect(_))
        ));
        assert!(store.is_empty());
    }
}
