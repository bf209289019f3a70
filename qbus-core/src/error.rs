// qbus-core/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("connection error: {0}")]
    Connection(String),

    /// Exchange or queue redeclared with parameters that diverge from the
    /// ones already on the broker. A configuration error, never retried.
    #[error("topology mismatch: {0}")]
    Topology(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("consume error: {0}")]
    Consume(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("timed out waiting for a reply")]
    TimedOut,

    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}
