//! Change notifications.
//!
//! The notifier fans a message out to every configured transport. Each
//! transport runs in its own task, so a slow or failing transport never
//! holds up the polling loop or the other transports.

mod email;
mod telegram;

pub use email::*;
pub use telegram::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::db::Outcome;
use crate::targets::Target;

/// Notification delivery errors. Logged, never retried.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("mail error: {0}")]
    Mail(String),
    #[error("delivery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A formatted state-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub text: String,
}

impl Message {
    pub fn new(target: &Target, outcome: &Outcome) -> Self {
        Self {
            subject: format!("Monitor: {} {}", target.name, outcome.status),
            text: format!(
                "[{}] {} -> {}\n{}",
                target.name, target.url, outcome.status, outcome.detail
            ),
        }
    }
}

/// An outbound notification channel.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Dispatches messages to zero or more transports.
#[derive(Clone, Default)]
pub struct Notifier {
    transports: Vec<Arc<dyn Transport>>,
}

impl Notifier {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// Build the transports that are configured. Missing settings disable a
    /// transport silently; invalid settings disable it with an error log.
    pub fn from_config(cfg: &ServerConfig) -> Self {
        let mut transports: Vec<Arc<dyn Transport>> = Vec::new();

        match &cfg.telegram {
            Some(telegram) => match TelegramTransport::new(telegram) {
                Ok(t) => transports.push(Arc::new(t)),
                Err(e) => tracing::error!("Telegram transport disabled: {}", e),
            },
            None => tracing::debug!("Telegram not configured"),
        }

        match &cfg.smtp {
            Some(smtp) => match EmailTransport::new(smtp) {
                Ok(t) => transports.push(Arc::new(t)),
                Err(e) => tracing::error!("Email transport disabled: {}", e),
            },
            None => tracing::debug!("Email not configured"),
        }

        Self { transports }
    }

    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Send a change notification to every transport.
    ///
    /// Returns immediately; the handles may be awaited or dropped.
    pub fn notify(&self, target: &Target, outcome: &Outcome) -> Vec<JoinHandle<()>> {
        let message = Arc::new(Message::new(target, outcome));

        self.transports
            .iter()
            .map(|transport| {
                let transport = transport.clone();
                let message = message.clone();
                tokio::spawn(async move {
                    match transport.send(&message).await {
                        Ok(()) => tracing::debug!("{} notification sent", transport.name()),
                        Err(e) => {
                            tracing::warn!("{} notification failed: {}", transport.name(), e)
                        }
                    }
                })
            })
            .collect()
    }
}
