use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, ExchangeKind,
};
use tracing::debug;

use qbus_core::Topology;

use crate::connection::BrokerConnection;

const PERSISTENT: u8 = 2;

/// Outbound half: one channel, the shared topic exchange and the service's
/// durable request queue, declared once at open.
pub(crate) struct Publisher {
    channel: Channel,
    topology: Topology,
}

impl Publisher {
    /// Declares the exchange and request queue. The broker rejects a
    /// redeclaration with mismatched parameters; that error propagates
    /// as-is so the caller can treat it as fatal.
    pub(crate) async fn open(
        connection: &BrokerConnection,
        topology: &Topology,
    ) -> Result<Self, lapin::Error> {
        let channel = connection.open_channel().await?;

        channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &topology.request_queue(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!(
            "publisher ready, exchange={} queue={}",
            topology.exchange,
            topology.request_queue()
        );

        Ok(Self {
            channel,
            topology: topology.clone(),
        })
    }

    /// Publishes one envelope, persistent, fire-and-forget: no publisher
    /// confirm is awaited. The routing key gets a `.{qid}` suffix when a
    /// reply is expected.
    pub(crate) async fn send(&self, body: &[u8], qid: Option<&str>) -> Result<(), lapin::Error> {
        let mut routing_key = self.topology.request_routing_key();
        if let Some(qid) = qid {
            routing_key.push('.');
            routing_key.push_str(qid);
        }

        debug!("publishing to {} with routing key {routing_key}", self.topology.exchange);

        let _confirm = self
            .channel
            .basic_publish(
                &self.topology.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await?;
        Ok(())
    }
}
