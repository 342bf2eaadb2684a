use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{BasicAckArguments, BasicConsumeArguments, BasicNackArguments, BasicPublishArguments, Channel, QueueBindArguments, QueueDeclareArguments},
    connection::{Connection, OpenConnectionArguments},
    consumer::AsyncConsumer,
    BasicProperties,
    Deliver,
    FieldTable,
};
use chrono::NaiveDate;
use log::{error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::mailer::EmailClient;
use crate::models::Booking;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Confirmation,
    Cancellation,
}

impl EmailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailKind::Confirmation => "confirmation",
            EmailKind::Cancellation => "cancellation",
        }
    }

    pub fn routing_key(self) -> &'static str {
        match self {
            EmailKind::Confirmation => "booking.confirmation",
            EmailKind::Cancellation => "booking.cancellation",
        }
    }
}

// Message published on booking state transitions; carries everything the
// email needs so the consumer never reads the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEmailMessage {
    pub to: String,
    pub customer_name: String,
    pub booking_reference: String,
    pub room_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_price: Decimal,
    pub kind: EmailKind,
}

impl BookingEmailMessage {
    pub fn from_booking(booking: &Booking, room_name: &str, kind: EmailKind) -> Self {
        Self {
            to: booking.customer_email.clone(),
            customer_name: booking.customer_name.clone(),
            booking_reference: booking.booking_reference.clone(),
            room_name: room_name.to_string(),
            check_in: booking.check_in,
            check_out: booking.check_out,
            guests: booking.guests,
            total_price: booking.total_price,
            kind,
        }
    }
}

// Consumer delivering queued booking emails
struct BookingEmailConsumer {
    mailer: EmailClient,
}

impl BookingEmailConsumer {
    fn new(mailer: EmailClient) -> Self {
        Self { mailer }
    }

    async fn handle_message(&mut self, channel: &Channel, deliver: Deliver, content: Vec<u8>) -> Result<()> {
        match serde_json::from_slice::<BookingEmailMessage>(&content) {
            Ok(message) => {
                info!("📧 Delivering {} email for booking {}", message.kind.as_str(), message.booking_reference);

                match self.mailer.send_booking_email(&message).await {
                    Ok(()) => {
                        if let Err(e) = channel.basic_ack(BasicAckArguments::new(deliver.delivery_tag(), false)).await {
                            error!("Error acknowledging message: {:?}", e);
                        }
                        Ok(())
                    }
                    Err(e) => {
                        error!("❌ Failed to send {} email for booking {}: {:?}", message.kind.as_str(), message.booking_reference, e);
                        // Dead-letter instead of requeue so a broken mailbox
                        // cannot loop forever
                        if let Err(e) = channel.basic_nack(BasicNackArguments::new(deliver.delivery_tag(), false, false)).await {
                            error!("Error rejecting message: {:?}", e);
                        }
                        Err(e)
                    }
                }
            }
            Err(e) => {
                error!("❌ Error deserializing booking email message: {:?}", e);
                // Reject without requeue - malformed message
                if let Err(e) = channel.basic_nack(BasicNackArguments::new(deliver.delivery_tag(), false, false)).await {
                    error!("Error rejecting message: {:?}", e);
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait::async_trait]
impl AsyncConsumer for BookingEmailConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        if let Err(e) = self.handle_message(channel, deliver, content).await {
            error!("❌ Failed to process booking email: {:?}", e);
        }
    }
}

/// Best-effort notification dispatcher. State transitions publish here;
/// delivery happens in a background consumer, and a publish failure is
/// logged and swallowed rather than failing the booking mutation.
#[derive(Clone)]
pub struct NotificationQueueService {
    connection: Option<Arc<Connection>>,
    mailer: EmailClient,
    amqp_host: String,
    amqp_port: u16,
    amqp_user: String,
    amqp_password: String,
    booking_exchange: String,
    email_queue: String,
    dead_letter_exchange: String,
    dead_letter_queue: String,
}

impl NotificationQueueService {
    pub fn new(config: &Config) -> Self {
        Self {
            connection: None,
            mailer: EmailClient::new(config.resend_api_key.clone(), config.email_from.clone()),
            amqp_host: config.amqp_host.clone(),
            amqp_port: config.amqp_port,
            amqp_user: config.amqp_user.clone(),
            amqp_password: config.amqp_password.clone(),
            booking_exchange: "booking.events".to_string(),
            email_queue: "booking.emails".to_string(),
            dead_letter_exchange: "booking.dlx".to_string(),
            dead_letter_queue: "booking.emails.failed".to_string(),
        }
    }

    pub async fn initialize(&mut self) -> Result<()> {
        info!("Connecting to RabbitMQ...");

        let connection = Connection::open(&OpenConnectionArguments::new(
            &self.amqp_host,
            self.amqp_port,
            &self.amqp_user,
            &self.amqp_password,
        ))
        .await?;

        connection
            .register_callback(DefaultConnectionCallback)
            .await?;

        let setup_channel = connection.open_channel(None).await?;
        setup_channel
            .register_callback(DefaultChannelCallback)
            .await?;

        // Booking events exchange (direct, routed by email kind)
        setup_channel
            .exchange_declare(
                amqprs::channel::ExchangeDeclareArguments::new(&self.booking_exchange, "direct")
                    .durable(true)
                    .finish(),
            )
            .await?;

        // Dead letter exchange and queue for undeliverable emails
        setup_channel
            .exchange_declare(
                amqprs::channel::ExchangeDeclareArguments::new(&self.dead_letter_exchange, "direct")
                    .durable(true)
                    .finish(),
            )
            .await?;

        setup_channel
            .queue_declare(
                QueueDeclareArguments::new(&self.dead_letter_queue)
                    .durable(true)
                    .finish(),
            )
            .await?;

        setup_channel
            .queue_bind(
                QueueBindArguments::new(&self.dead_letter_queue, &self.dead_letter_exchange, "booking.email.failed")
                    .finish(),
            )
            .await?;

        // The email queue dead-letters failed deliveries
        let mut args = FieldTable::new();
        args.insert(
            "x-dead-letter-exchange".try_into()?,
            self.dead_letter_exchange.clone().into(),
        );
        args.insert(
            "x-dead-letter-routing-key".try_into()?,
            "booking.email.failed".into(),
        );

        setup_channel
            .queue_declare(
                QueueDeclareArguments::new(&self.email_queue)
                    .durable(true)
                    .arguments(args)
                    .finish(),
            )
            .await?;

        for kind in [EmailKind::Confirmation, EmailKind::Cancellation] {
            setup_channel
                .queue_bind(
                    QueueBindArguments::new(&self.email_queue, &self.booking_exchange, kind.routing_key())
                        .finish(),
                )
                .await?;
        }

        self.connection = Some(Arc::new(connection));

        let _ = setup_channel.close().await;

        info!("Connected to RabbitMQ and initialized notification queues");

        Ok(())
    }

    async fn get_fresh_channel(&self) -> Result<Channel> {
        if let Some(connection) = &self.connection {
            let channel = connection.open_channel(None).await?;
            channel.register_callback(DefaultChannelCallback).await?;

            // Small delay to ensure channel is fully ready
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;

            Ok(channel)
        } else {
            Err("RabbitMQ connection not initialized".into())
        }
    }

    // Retry with backoff, then swallow: a notification must never fail the
    // booking mutation that produced it
    async fn safe_queue_operation<F, Fut>(&self, operation: F) -> Result<()>
    where
        F: Fn() -> Fut + Clone,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let max_retries = 2;
        let mut delay_ms = 25;

        for attempt in 1..=max_retries {
            match operation().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if attempt < max_retries {
                        warn!("Queue operation failed (attempt {}/{}), retrying: {:?}", attempt, max_retries, e);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                        delay_ms *= 2;
                    } else {
                        error!("Queue operation failed after {} attempts, giving up: {:?}", max_retries, e);
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn publish_booking_email(&self, message: &BookingEmailMessage) -> Result<()> {
        let message = message.clone();

        let operation = move || {
            let message = message.clone();
            let service = self.clone();

            async move {
                let channel = service.get_fresh_channel().await?;

                let serialized = serde_json::to_string(&message)?;
                let content = serialized.as_bytes().to_vec();

                let properties = BasicProperties::default()
                    .with_delivery_mode(2) // persistent
                    .finish();

                let args = BasicPublishArguments::new(&service.booking_exchange, message.kind.routing_key());

                channel.basic_publish(properties, content, args).await?;

                let _ = channel.close().await;

                info!("Queued {} email for booking {}", message.kind.as_str(), message.booking_reference);
                Ok(())
            }
        };

        self.safe_queue_operation(operation).await
    }

    pub async fn start_consuming_booking_emails(&self) -> Result<()> {
        if let Some(connection) = &self.connection {
            info!("🚀 Starting booking email consumer on queue: {}", self.email_queue);

            let channel = connection.open_channel(None).await?;
            channel.register_callback(DefaultChannelCallback).await?;

            let mailer = self.mailer.clone();
            let email_queue = self.email_queue.clone();

            let consumer_tag = format!("booking_email_consumer_{}", Uuid::new_v4());
            let args = BasicConsumeArguments::new(&email_queue, &consumer_tag)
                .manual_ack(true)
                .finish();

            let consumer = BookingEmailConsumer::new(mailer);

            tokio::spawn(async move {
                match channel.basic_consume(consumer, args).await {
                    Ok(_) => {
                        info!("✅ Booking email consumer started successfully");
                        // Keep the consumer alive
                        loop {
                            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                        }
                    }
                    Err(e) => {
                        error!("❌ Failed to start booking email consumer: {:?}", e);
                    }
                }
            });
        } else {
            return Err("RabbitMQ connection not initialized".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_by_kind() {
        assert_eq!(EmailKind::Confirmation.routing_key(), "booking.confirmation");
        assert_eq!(EmailKind::Cancellation.routing_key(), "booking.cancellation");
    }
}
