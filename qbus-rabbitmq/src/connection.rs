use std::time::Duration;

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::{sync::RwLock, time::sleep};
use tracing::{info, warn};

use qbus_core::BusError;

/// One physical broker connection, replaced wholesale on failure. Channels
/// are handed out to publishers and reply consumers; each owns its channel
/// exclusively for its lifetime.
pub struct BrokerConnection {
    uri: String,
    retry_interval: Duration,
    state: RwLock<Option<Connection>>,
}

impl BrokerConnection {
    pub fn new(uri: impl Into<String>, retry_interval: Duration) -> Self {
        Self {
            uri: uri.into(),
            retry_interval,
            state: RwLock::new(None),
        }
    }

    /// Blocks until a live connection exists. Never fails permanently:
    /// attempts are repeated at a fixed interval until one succeeds.
    pub async fn ensure_connected(&self) {
        loop {
            if self.is_open().await {
                return;
            }
            match self.connect_once().await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "broker unreachable ({e}), retrying in {}s",
                        self.retry_interval.as_secs()
                    );
                    sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// Creates a fresh channel from the current connection. Callers run
    /// `ensure_connected` first; a missing connection here is an error.
    pub async fn open_channel(&self) -> Result<Channel, lapin::Error> {
        let guard = self.state.read().await;
        match guard.as_ref() {
            Some(conn) => conn.create_channel().await,
            None => Err(lapin::Error::InvalidConnectionState(
                lapin::ConnectionState::Closed,
            )),
        }
    }

    async fn is_open(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.status().connected())
    }

    async fn connect_once(&self) -> Result<(), lapin::Error> {
        let conn = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        info!("connected to broker at {}", self.uri);
        *self.state.write().await = Some(conn);
        Ok(())
    }
}

/// The broker-shutdown class of errors: the connection (or its channel) is
/// gone and a reconnect plus full-request retry is the right response.
pub(crate) fn is_connection_failure(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::IOError(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::InvalidChannelState(_)
            | lapin::Error::MissingHeartbeatError
    )
}

/// AMQP 406 precondition-failed: an exchange or queue was redeclared with
/// different parameters. Fatal, not retryable.
pub(crate) fn is_topology_mismatch(err: &lapin::Error) -> bool {
    matches!(err, lapin::Error::ProtocolError(e) if e.get_id() == 406)
}

pub(crate) fn classify(err: lapin::Error, fallback: fn(String) -> BusError) -> BusError {
    if is_topology_mismatch(&err) {
        BusError::Topology(err.to_string())
    } else if is_connection_failure(&err) {
        BusError::Connection(err.to_string())
    } else {
        fallback(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn io_and_state_errors_are_connection_failures() {
        let io_err = lapin::Error::IOError(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(is_connection_failure(&io_err));
        assert!(is_connection_failure(&lapin::Error::MissingHeartbeatError));
        assert!(is_connection_failure(&lapin::Error::InvalidChannelState(
            lapin::ChannelState::Closed
        )));
        assert!(!is_topology_mismatch(&io_err));
    }

    #[test]
    fn classify_falls_back_for_other_errors() {
        let err = lapin::Error::ChannelsLimitReached;
        assert!(matches!(
            classify(err, BusError::Publish),
            BusError::Publish(_)
        ));
    }
}
