//! Email notification channel
//!
//! Delivers via async SMTP. Unconfigured SMTP leaves the adapter
//! unavailable rather than failing sends at admission time.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{ChannelAdapter, ChannelError, ChannelResult, ChannelSuccess};
use crate::config_utils;
use crate::models::Notification;
use crate::services::notifications::types::NotificationChannel;

pub struct EmailChannel {
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl EmailChannel {
    /// Build from SMTP_* environment configuration.
    pub fn from_env() -> Self {
        let host = match config_utils::get_smtp_host() {
            Some(host) => host,
            None => {
                tracing::info!("SMTP not configured, email channel unavailable");
                return Self { mailer: None, from: None };
            }
        };

        let from = config_utils::get_smtp_from().and_then(|f| f.parse::<Mailbox>().ok());
        if from.is_none() {
            tracing::warn!("SMTP_FROM missing or unparsable, email channel unavailable");
            return Self { mailer: None, from: None };
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
            .unwrap_or_else(|_| AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host))
            .port(config_utils::get_smtp_port());

        if let (Some(user), Some(password)) =
            (config_utils::get_smtp_user(), config_utils::get_smtp_password())
        {
            builder = builder.credentials(Credentials::new(user, password));
        }

        Self {
            mailer: Some(builder.build()),
            from,
        }
    }

    #[cfg(test)]
    pub fn unconfigured() -> Self {
        Self { mailer: None, from: None }
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    fn is_available(&self) -> bool {
        self.mailer.is_some()
    }

    async fn send(&self, notification: &Notification) -> ChannelResult {
        let (mailer, from) = match (&self.mailer, &self.from) {
            (Some(mailer), Some(from)) => (mailer, from),
            _ => return Err(ChannelError::Retriable("SMTP transport not configured".into())),
        };

        // A malformed address can never succeed, no matter how often we retry.
        let to: Mailbox = notification
            .recipient
            .parse()
            .map_err(|e| ChannelError::Fatal(format!("invalid email recipient: {e}")))?;

        let subject = notification.subject.as_deref().unwrap_or("Notification");

        let builder = Message::builder().from(from.clone()).to(to).subject(subject);
        let message = match &notification.html_content {
            Some(html) => builder
                .header(ContentType::TEXT_HTML)
                .body(html.clone())
                .map_err(|e| ChannelError::Fatal(format!("message build failed: {e}")))?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(notification.content.clone())
                .map_err(|e| ChannelError::Fatal(format!("message build failed: {e}")))?,
        };

        match mailer.send(message).await {
            Ok(response) => Ok(ChannelSuccess {
                provider_id: Some(response.code().to_string()),
            }),
            Err(e) if e.is_permanent() => Err(ChannelError::Fatal(format!("SMTP rejected message: {e}"))),
            Err(e) => Err(ChannelError::Retriable(format!("SMTP send failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestFixtures;

    #[tokio::test]
    async fn unconfigured_channel_reports_unavailable_and_retriable() {
        let channel = EmailChannel::unconfigured();
        assert!(!channel.is_available());

        let notification = TestFixtures::notification_value("email", "a@b.c");
        let result = channel.send(&notification).await;
        assert!(matches!(result, Err(ChannelError::Retriable(_))));
    }
}
