// qbus-core/src/handler.rs
use crate::BusError;
use async_trait::async_trait;
use serde_json::Value;

/// Service-side callback. Receives the unwrapped `q` payload of one request
/// and produces the reply body that is routed back to the caller's
/// correlation queue (when the request carried a qid).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Value) -> Result<Value, BusError>;
}
