use memoria_core::error::StorageError;
use std::future::Future;
use tracing::warn;

/// Run a storage operation, retrying exactly once.
///
/// A second failure is surfaced as [`StorageError::Unavailable`].
pub(crate) async fn retry_once<T, F, Fut>(key: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(key, error = %first, "Storage operation failed, retrying once");
            op().await.map_err(|second| StorageError::Unavailable {
                key: key.to_string(),
                reason: second.to_string(),
            })
        }
    }
}
