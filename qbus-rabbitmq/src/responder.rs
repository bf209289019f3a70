use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, ExchangeKind,
};
use tokio::time::sleep;
use tracing::{error, info, warn};

use qbus_core::{BusError, Envelope, RequestHandler, Topology};

use crate::{connection::BrokerConnection, options::AmqpOptions};

/// Service side of the request/response cycle: consumes the durable request
/// queue and routes each reply back to the caller's correlation queue when
/// the request carried a qid.
pub struct Responder {
    opts: AmqpOptions,
    topology: Topology,
    connection: Arc<BrokerConnection>,
}

impl Responder {
    pub fn new(opts: AmqpOptions) -> Self {
        let topology = Topology::new(&opts.exchange, &opts.service, &opts.topic);
        let connection = Arc::new(BrokerConnection::new(&opts.uri, opts.reconnect_interval));
        Self {
            opts,
            topology,
            connection,
        }
    }

    /// Spawns the consume loop. Any transport failure falls back to
    /// reconnect-and-redeclare; the loop never gives up on its own.
    pub fn serve(self, handler: Arc<dyn RequestHandler>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.connection.ensure_connected().await;

                let channel = match self.open_and_declare().await {
                    Ok(channel) => channel,
                    Err(e) => {
                        error!("topology declare failed: {e}");
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let mut consumer = match channel
                    .basic_consume(
                        &self.topology.request_queue(),
                        &format!("{}-responder", self.opts.service),
                        BasicConsumeOptions {
                            no_ack: false,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                {
                    Ok(consumer) => consumer,
                    Err(e) => {
                        error!("basic_consume failed: {e}");
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                info!(
                    "{} consuming {} on exchange {}",
                    self.opts.service,
                    self.topology.request_queue(),
                    self.topology.exchange
                );

                while let Some(delivery) = consumer.next().await {
                    match delivery {
                        Ok(delivery) => {
                            match self
                                .dispatch(&channel, handler.as_ref(), &delivery.data)
                                .await
                            {
                                Ok(()) => {
                                    let _ = delivery.ack(BasicAckOptions::default()).await;
                                }
                                Err(e) => {
                                    error!("request handling failed: {e}");
                                    let _ = delivery
                                        .nack(BasicNackOptions {
                                            multiple: false,
                                            requeue: false,
                                        })
                                        .await;
                                }
                            }
                        }
                        Err(e) => {
                            error!("delivery error: {e}");
                            break;
                        }
                    }
                }

                warn!("{} consume stream ended, reconnecting", self.opts.service);
                sleep(Duration::from_secs(1)).await;
            }
        })
    }

    async fn open_and_declare(&self) -> Result<Channel, lapin::Error> {
        let channel = self.connection.open_channel().await?;

        channel
            .exchange_declare(
                &self.topology.exchange,
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
                &self.topology.request_queue(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &self.topology.request_queue(),
                &self.topology.exchange,
                &self.topology.request_binding_pattern(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(channel)
    }

    async fn dispatch(
        &self,
        channel: &Channel,
        handler: &dyn RequestHandler,
        body: &[u8],
    ) -> Result<(), BusError> {
        let envelope = Envelope::from_bytes(body)?;
        let reply = handler.handle(envelope.q).await?;

        // No qid means the caller is not waiting; the reply is dropped.
        if let Some(qid) = envelope.qid {
            let body = serde_json::to_vec(&reply)
                .map_err(|e| BusError::Serialization(e.to_string()))?;
            channel
                .basic_publish(
                    &self.topology.exchange,
                    &self.topology.response_routing_key(&qid),
                    BasicPublishOptions::default(),
                    &body,
                    BasicProperties::default().with_content_type("application/json".into()),
                )
                .await
                .map_err(|e| BusError::Publish(e.to_string()))?;
        }
        Ok(())
    }
}
