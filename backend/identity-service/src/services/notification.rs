/// Out-of-band delivery of verification codes
///
/// SMS goes through AWS SNS, email through SMTP (`lettre`). Channels without
/// configured infrastructure fall back to `LoggingDispatcher`.
use crate::config::{EmailSettings, SmsSettings};
use crate::models::{Address, Channel};
use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client as SnsClient;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Channel not supported by this dispatcher: {0}")]
    UnsupportedChannel(&'static str),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Provider rejected message: {0}")]
    Provider(String),
}

/// Deliver a plaintext code to an address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError>;
}

fn code_message(code: &str) -> String {
    format!("Your verification code is: {code}. Do not share it with anyone.")
}

/// Transactional SMS over AWS SNS
pub struct SmsDispatcher {
    client: SnsClient,
    sender_id: Option<String>,
}

impl SmsDispatcher {
    pub fn new(client: SnsClient, settings: &SmsSettings) -> Self {
        Self {
            client,
            sender_id: settings.sender_id.clone(),
        }
    }

    fn string_attribute(value: &str) -> Result<MessageAttributeValue, DeliveryError> {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| DeliveryError::Provider(format!("Failed to build SMS attribute: {e}")))
    }
}

#[async_trait]
impl NotificationDispatcher for SmsDispatcher {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError> {
        let Address::Phone(phone_number) = address else {
            return Err(DeliveryError::UnsupportedChannel(address.channel().as_str()));
        };

        let mut request = self
            .client
            .publish()
            .phone_number(phone_number)
            .message(code_message(code))
            .message_attributes("AWS.SNS.SMS.SMSType", Self::string_attribute("Transactional")?);
        if let Some(sender_id) = &self.sender_id {
            request = request
                .message_attributes("AWS.SNS.SMS.SenderID", Self::string_attribute(sender_id)?);
        }

        match request.send().await {
            Ok(output) => {
                info!(
                    phone = %address,
                    message_id = ?output.message_id(),
                    "SMS sent successfully"
                );
                Ok(())
            }
            Err(e) => {
                error!(phone = %address, error = %e, "Failed to send SMS");
                Err(DeliveryError::Provider(e.to_string()))
            }
        }
    }
}

/// Verification emails over SMTP
pub struct EmailDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailDispatcher {
    /// Build the SMTP transport; `None` when no SMTP host is configured
    pub fn from_settings(settings: &EmailSettings) -> anyhow::Result<Option<Self>> {
        use anyhow::Context;

        let Some(host) = &settings.smtp_host else {
            return Ok(None);
        };

        let from = settings
            .smtp_from
            .parse::<Mailbox>()
            .context("Invalid SMTP_FROM address")?;

        let builder = if settings.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        }
        .context("Failed to configure SMTP transport")?
        .port(settings.smtp_port);

        let builder = if let (Some(username), Some(password)) =
            (&settings.smtp_username, &settings.smtp_password)
        {
            builder.credentials(Credentials::new(username.to_string(), password.to_string()))
        } else {
            builder
        };

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }
}

#[async_trait]
impl NotificationDispatcher for EmailDispatcher {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError> {
        let Address::Email(recipient) = address else {
            return Err(DeliveryError::UnsupportedChannel(address.channel().as_str()));
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::InvalidRecipient(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your verification code")
            .header(header::ContentType::TEXT_PLAIN)
            .body(format!(
                "{}\n\nIf you did not request this, please ignore this email.",
                code_message(code)
            ))
            .map_err(|e| DeliveryError::Provider(format!("Failed to build email message: {e}")))?;

        self.transport.send(email).await.map_err(|e| {
            error!(email = %address, error = %e, "Failed to send email");
            DeliveryError::Provider(e.to_string())
        })?;

        info!(email = %address, "Verification email sent");
        Ok(())
    }
}

/// Development dispatcher: writes the code to the log instead of sending it
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError> {
        warn!(
            address = %address,
            channel = address.channel().as_str(),
            code = %code,
            "Delivery not configured - code logged for development"
        );
        Ok(())
    }
}

/// Routes each address to the dispatcher for its channel
pub struct ChannelDispatcher {
    email: Arc<dyn NotificationDispatcher>,
    sms: Arc<dyn NotificationDispatcher>,
}

impl ChannelDispatcher {
    pub fn new(email: Arc<dyn NotificationDispatcher>, sms: Arc<dyn NotificationDispatcher>) -> Self {
        Self { email, sms }
    }

    /// Wire real providers where configured, logging fallback elsewhere
    pub async fn from_settings(email: &EmailSettings, sms: &SmsSettings) -> anyhow::Result<Self> {
        let email_dispatcher: Arc<dyn NotificationDispatcher> =
            match EmailDispatcher::from_settings(email)? {
                Some(dispatcher) => Arc::new(dispatcher),
                None => {
                    warn!("SMTP host not configured; email codes will only be logged");
                    Arc::new(LoggingDispatcher)
                }
            };

        let sms_dispatcher: Arc<dyn NotificationDispatcher> = if sms.enabled {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Arc::new(SmsDispatcher::new(SnsClient::new(&aws_config), sms))
        } else {
            warn!("SMS delivery disabled; phone codes will only be logged");
            Arc::new(LoggingDispatcher)
        };

        Ok(Self::new(email_dispatcher, sms_dispatcher))
    }
}

#[async_trait]
impl NotificationDispatcher for ChannelDispatcher {
    async fn deliver(&self, address: &Address, code: &str) -> Result<(), DeliveryError> {
        match address.channel() {
            Channel::Email => self.email.deliver(address, code).await,
            Channel::Phone => self.sms.deliver(address, code).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_dispatcher_routes_by_channel() {
        let mut email = MockNotificationDispatcher::new();
        email
            .expect_deliver()
            .withf(|address, code| address.channel() == Channel::Email && code == "1234")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sms = MockNotificationDispatcher::new();
        sms.expect_deliver()
            .withf(|address, code| address.as_str() == "+14155551234" && code == "9876")
            .times(1)
            .returning(|_, _| Err(DeliveryError::Provider("throttled".to_string())));

        let dispatcher = ChannelDispatcher::new(Arc::new(email), Arc::new(sms));

        dispatcher
            .deliver(&Address::Email("a@example.com".to_string()), "1234")
            .await
            .unwrap();
        let err = dispatcher
            .deliver(&Address::Phone("+14155551234".to_string()), "9876")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Provider(_)));
    }

    #[tokio::test]
    async fn test_logging_dispatcher_always_succeeds() {
        let address = Address::Phone("+14155551234".to_string());
        assert!(LoggingDispatcher.deliver(&address, "0000").await.is_ok());
    }
}
