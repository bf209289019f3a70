use async_trait::async_trait;
use serde_json::Value;
use tokio::{sync::RwLock, time::timeout};
use tracing::{info, warn};
use uuid::Uuid;

use qbus_core::{BusError, Envelope, Reply, RequestBus, Topology};

use crate::{
    connection::{classify, is_connection_failure, BrokerConnection},
    options::AmqpOptions,
    publisher::Publisher,
    reply::ReplyConsumer,
};

enum AttemptError {
    /// Broker shutdown signal: reconnect and retry the whole request with a
    /// fresh qid, the old consumer/qid pair may be stale.
    BrokerDown(lapin::Error),
    Fatal(BusError),
    TimedOut,
}

fn transport(err: lapin::Error, fallback: fn(String) -> BusError) -> AttemptError {
    if is_connection_failure(&err) {
        AttemptError::BrokerDown(err)
    } else {
        AttemptError::Fatal(classify(err, fallback))
    }
}

/// Counts full-request retries after broker shutdown signals. A `None`
/// limit grants retries until the broker comes back.
struct RetryBudget {
    limit: Option<u32>,
    used: u32,
}

impl RetryBudget {
    fn new(limit: Option<u32>) -> Self {
        Self { limit, used: 0 }
    }

    /// Registers one reconnect-worthy failure. Errors once the budget is
    /// spent; the reported count is the number of retries that were
    /// actually granted, not the failure that exhausted them.
    fn register_failure(&mut self) -> Result<u32, BusError> {
        match self.limit {
            Some(limit) if self.used >= limit => {
                Err(BusError::RetriesExhausted { attempts: limit })
            }
            _ => {
                self.used += 1;
                Ok(self.used)
            }
        }
    }
}

/// Orchestrates one request/response cycle over the topic exchange: fresh
/// qid, reply consumer bound first, then publish, then block on the reply.
/// Owns its connection and publisher; both are replaced wholesale when the
/// broker goes away mid-request.
pub struct RequestCoordinator {
    opts: AmqpOptions,
    topology: Topology,
    connection: BrokerConnection,
    publisher: RwLock<Publisher>,
}

impl RequestCoordinator {
    /// Blocks until the broker is reachable, then declares the topology.
    /// A declare rejected by the broker (parameter mismatch) is fatal.
    pub async fn connect(opts: AmqpOptions) -> Result<Self, BusError> {
        let topology = Topology::new(&opts.exchange, &opts.service, &opts.topic);
        let connection = BrokerConnection::new(&opts.uri, opts.reconnect_interval);
        connection.ensure_connected().await;

        let publisher = Publisher::open(&connection, &topology)
            .await
            .map_err(|e| classify(e, BusError::Connection))?;

        info!("{} coordinator ready on topic {}", opts.service, opts.topic);

        Ok(Self {
            opts,
            topology,
            connection,
            publisher: RwLock::new(publisher),
        })
    }

    fn new_qid() -> String {
        format!("q{}", Uuid::new_v4().simple())
    }

    async fn attempt(&self, q: &Value, wait: bool) -> Result<Reply, AttemptError> {
        if !wait {
            let body = Envelope {
                q: q.clone(),
                qid: None,
            }
            .to_bytes()
            .map_err(AttemptError::Fatal)?;
            self.publisher
                .read()
                .await
                .send(&body, None)
                .await
                .map_err(|e| transport(e, BusError::Publish))?;
            return Ok(Reply::NoResponseRequested);
        }

        let qid = Self::new_qid();
        // Bound before the publish: a fast remote could otherwise reply
        // before the queue exists and the reply would be lost.
        let mut consumer = ReplyConsumer::bind(&self.connection, &self.topology, &qid)
            .await
            .map_err(|e| transport(e, BusError::Consume))?;

        let outcome = self.publish_then_receive(q, &qid, &mut consumer).await;
        consumer.close().await;
        outcome.map(Reply::Delivered)
    }

    async fn publish_then_receive(
        &self,
        q: &Value,
        qid: &str,
        consumer: &mut ReplyConsumer,
    ) -> Result<String, AttemptError> {
        let body = Envelope {
            q: q.clone(),
            qid: Some(qid.to_owned()),
        }
        .to_bytes()
        .map_err(AttemptError::Fatal)?;

        self.publisher
            .read()
            .await
            .send(&body, Some(qid))
            .await
            .map_err(|e| transport(e, BusError::Publish))?;

        match self.opts.reply_timeout {
            Some(limit) => match timeout(limit, consumer.receive()).await {
                Ok(received) => received.map_err(|e| transport(e, BusError::Consume)),
                Err(_) => Err(AttemptError::TimedOut),
            },
            None => consumer
                .receive()
                .await
                .map_err(|e| transport(e, BusError::Consume)),
        }
    }
}

#[async_trait]
impl RequestBus for RequestCoordinator {
    async fn communicate<T: serde::Serialize + Send + Sync>(
        &self,
        payload: &T,
    ) -> Result<String, BusError> {
        match self.communicate_with(payload, true).await? {
            Reply::Delivered(text) => Ok(text),
            Reply::NoResponseRequested => Err(BusError::Consume("no reply was awaited".into())),
        }
    }

    async fn communicate_with<T: serde::Serialize + Send + Sync>(
        &self,
        payload: &T,
        wait_for_response: bool,
    ) -> Result<Reply, BusError> {
        let q = serde_json::to_value(payload)
            .map_err(|e| BusError::Serialization(e.to_string()))?;

        let mut budget = RetryBudget::new(self.opts.max_retries);
        loop {
            match self.attempt(&q, wait_for_response).await {
                Ok(reply) => return Ok(reply),
                Err(AttemptError::TimedOut) => return Err(BusError::TimedOut),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::BrokerDown(e)) => {
                    let retry = budget.register_failure()?;
                    warn!("broker lost mid-request ({e}), reconnecting, retry {retry}");
                    self.connection.ensure_connected().await;
                    match Publisher::open(&self.connection, &self.topology).await {
                        Ok(publisher) => *self.publisher.write().await = publisher,
                        // Connection dropped again under us; the next pass
                        // of the loop reconnects.
                        Err(e) if is_connection_failure(&e) => continue,
                        Err(e) => return Err(classify(e, BusError::Connection)),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn qids_are_short_opaque_and_prefixed() {
        let qid = RequestCoordinator::new_qid();
        assert!(qid.starts_with('q'));
        assert!(qid.len() < 64);
        assert!(qid.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn qids_do_not_collide() {
        let qids: HashSet<_> = (0..10_000).map(|_| RequestCoordinator::new_qid()).collect();
        assert_eq!(qids.len(), 10_000);
    }

    #[test]
    fn retry_budget_grants_exactly_the_configured_retries() {
        let mut budget = RetryBudget::new(Some(3));
        assert_eq!(budget.register_failure().unwrap(), 1);
        assert_eq!(budget.register_failure().unwrap(), 2);
        assert_eq!(budget.register_failure().unwrap(), 3);
        match budget.register_failure() {
            Err(BusError::RetriesExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn unlimited_retry_budget_never_exhausts() {
        let mut budget = RetryBudget::new(None);
        for expected in 1..=1_000 {
            assert_eq!(budget.register_failure().unwrap(), expected);
        }
    }
}
