// qbus-core/src/bus.rs
use async_trait::async_trait;
use crate::{BusError, Reply};

/// Synchronous request/response surface over an asynchronous broker.
///
/// `communicate` suspends the caller until the correlated reply arrives;
/// `communicate_with(_, false)` is fire-and-forget.
#[async_trait]
pub trait RequestBus: Send + Sync {
    async fn communicate<T: serde::Serialize + Send + Sync>(
        &self,
        payload: &T,
    ) -> Result<String, BusError>;

    async fn communicate_with<T: serde::Serialize + Send + Sync>(
        &self,
        payload: &T,
        wait_for_response: bool,
    ) -> Result<Reply, BusError>;
}
