use futures_util::StreamExt;
use lapin::{options::*, types::FieldTable, Channel};
use tracing::debug;

use qbus_core::Topology;

use crate::connection::BrokerConnection;

const REPLY_SUCCESS: u16 = 200;

/// Throwaway per-request consumer: a server-named, exclusive, auto-delete
/// queue bound to `<topic>.response.{qid}`. Must be fully bound before the
/// request is published, or an instant reply could be lost.
pub(crate) struct ReplyConsumer {
    channel: Channel,
    queue: String,
    qid: String,
}

impl ReplyConsumer {
    pub(crate) async fn bind(
        connection: &BrokerConnection,
        topology: &Topology,
        qid: &str,
    ) -> Result<Self, lapin::Error> {
        let channel = connection.open_channel().await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue = queue.name().as_str().to_owned();

        let binding_key = topology.reply_binding_key(qid);
        channel
            .queue_bind(
                &queue,
                &topology.exchange,
                &binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!("reply consumer {queue} bound to {binding_key}");

        Ok(Self {
            channel,
            queue,
            qid: qid.to_owned(),
        })
    }

    /// Waits for exactly one delivery, acks it and returns its body as
    /// UTF-8 text. A terminated stream means the channel died mid-wait.
    pub(crate) async fn receive(&mut self) -> Result<String, lapin::Error> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                &format!("reply-{}", self.qid),
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        match consumer.next().await {
            Some(delivery) => {
                let delivery = delivery?;
                let text = String::from_utf8_lossy(&delivery.data).into_owned();
                debug!("reply consumer {} received {} bytes", self.queue, delivery.data.len());
                delivery.ack(BasicAckOptions::default()).await?;
                Ok(text)
            }
            None => Err(lapin::Error::InvalidChannelState(
                lapin::ChannelState::Closed,
            )),
        }
    }

    /// Closes the channel; the exclusive queue auto-deletes with it.
    pub(crate) async fn close(self) {
        debug!("reply consumer {} closing channel", self.queue);
        let _ = self.channel.close(REPLY_SUCCESS, "done").await;
    }
}
