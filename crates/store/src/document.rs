//! JSON document access on top of the raw object store.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use depot_storage::{ObjectStore, PutOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Documents change on every commit; edges revalidate and rely on
/// invalidation for freshness.
pub const DOCUMENT_CACHE_CONTROL: &str = "max-age=0, no-cache, must-revalidate";

pub(crate) fn document_options() -> PutOptions {
    PutOptions::json().with_cache_control(DOCUMENT_CACHE_CONTROL)
}

/// Read and parse a JSON document. A missing object is `None`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    storage: &dyn ObjectStore,
    key: &str,
) -> StoreResult<Option<T>> {
    let data = match storage.get(key).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| StoreError::serialization(key, e))
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(
    storage: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| StoreError::serialization(key, e))?;
    storage.put(key, Bytes::from(body), &document_options()).await?;
    Ok(())
}

/// Delete an object, reporting whether it was there.
pub(crate) async fn delete_if_exists(storage: &dyn ObjectStore, key: &str) -> StoreResult<bool> {
    match storage.delete(key).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
