//! SMTP mail transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport as _};
use std::time::Duration;

use super::{Message, NotifyError, Transport};
use crate::config::SmtpConfig;

const DEFAULT_FROM: &str = "monitor@example.com";

pub struct EmailTransport {
    mailer: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl EmailTransport {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = cfg.user.as_deref().unwrap_or(DEFAULT_FROM).parse()?;
        let to = cfg.email_to.parse()?;

        let mut builder = SmtpTransport::starttls_relay(&cfg.host)
            .map_err(|e| NotifyError::Mail(e.to_string()))?
            .port(cfg.port)
            .timeout(Some(Duration::from_secs(10)));

        if let (Some(user), Some(password)) = (&cfg.user, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }

    fn build(&self, message: &Message) -> Result<lettre::Message, NotifyError> {
        lettre::Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.text.clone())
            .map_err(|e| NotifyError::Mail(e.to_string()))
    }
}

#[async_trait]
impl Transport for EmailTransport {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let email = self.build(message)?;
        let mailer = self.mailer.clone();

        // The SMTP client blocks; keep it off the async workers.
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await?
            .map_err(|e| NotifyError::Mail(e.to_string()))?;

        Ok(())
    }
}
