use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::warn;

use super::{BrokerChannel, BrokerTransport, TransportError};

/// AMQP `delivery_mode` marking a message persistent.
const DELIVERY_MODE_PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

/// Production transport over RabbitMQ.
///
/// Each successful `connect` yields a fresh connection plus channel and
/// declares the target queue as durable, so records survive a broker
/// restart once acknowledged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpTransport;

#[async_trait]
impl BrokerTransport for AmqpTransport {
    async fn connect(
        &self,
        url: &str,
        queue: &str,
    ) -> Result<Box<dyn BrokerChannel>, TransportError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(transport_err)?;

        let channel = connection.create_channel().await.map_err(transport_err)?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(transport_err)?;

        Ok(Box::new(AmqpChannel {
            connection,
            channel,
        }))
    }
}

struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type("application/json".into());

        // Default exchange; routing key is the queue name.
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(transport_err)?;

        confirm.await.map_err(transport_err)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&mut self) {
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "collector shutdown").await {
            warn!(error = %e, "error while closing broker connection");
        }
    }
}

fn transport_err(e: lapin::Error) -> TransportError {
    TransportError(e.to_string())
}
