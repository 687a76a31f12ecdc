pub mod auth;
pub mod catalog;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod products;

use anyhow::anyhow;
use tracing::error;

use crate::error::{ApiError, ApiResult};

/// Run a store-bound closure off the async runtime.
pub async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Store(anyhow!("blocking task failed: {}", e))
    })?
}
