use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use offsetting_protocol::ContentRef;

use crate::StorageError;

/// A content-addressed store: documents go in, immutable references come out.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a JSON document and return its content reference.
    async fn put(&self, document: &Value) -> Result<ContentRef, StorageError>;
}

/// Serialize `document` and stage it in `store`.
pub async fn stage<T: Serialize + Sync + ?Sized>(
    store: &dyn ContentStore,
    document: &T,
) -> Result<ContentRef, StorageError> {
    let value = serde_json::to_value(document).map_err(|e| StorageError::Document(e.to_string()))?;
    if !value.is_object() {
        return Err(StorageError::Document("document must be a mapping".into()));
    }
    let content_ref = store.put(&value).await?;
    tracing::debug!(content_ref = %content_ref, "Staged document");
    Ok(content_ref)
}
