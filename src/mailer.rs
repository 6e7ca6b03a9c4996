//! Outgoing email: forwarded to an HTTP relay, or only logged.
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("No recipients defined")]
    MissingRecipient,
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay rejected message: {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid relay url: {0}")]
    BadRelayUrl(String),
}

/// Fields are optional on purpose: the endpoint forwards whatever it got.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl EmailMessage {
    fn recipient(&self) -> Result<&str, MailError> {
        self.to
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(MailError::MissingRecipient)
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Builds the mailer selected by config: relay when `relay_url` is set.
pub fn from_config(cfg: &config::Email) -> Result<Box<dyn Mailer>, MailError> {
    if cfg.relay_url.trim().is_empty() {
        return Ok(Box::new(LogMailer::default()));
    }
    let url = Url::parse(cfg.relay_url.trim())
        .map_err(|e| MailError::BadRelayUrl(e.to_string()))?;
    Ok(Box::new(RelayMailer::new(url, cfg.from.clone())))
}

#[derive(Clone)]
pub struct RelayMailer {
    http: Client,
    relay_url: Url,
    from: String,
}

impl std::fmt::Debug for RelayMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMailer")
            .field("relay_url", &self.relay_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl RelayMailer {
    pub fn new(relay_url: Url, from: String) -> Self {
        Self {
            http: Client::new(),
            relay_url,
            from,
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let to = message.recipient()?;
        let payload = RelayPayload {
            from: &self.from,
            to,
            subject: message.subject.as_deref().unwrap_or_default(),
            text: message.text.as_deref().unwrap_or_default(),
        };
        let res = self
            .http
            .post(self.relay_url.clone())
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            warn!(status, %body, "mail relay rejected message");
            return Err(MailError::Rejected { status, body });
        }
        info!(%to, "email handed to relay");
        Ok(())
    }
}

/// Records messages instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl LogMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let to = message.recipient()?;
        info!(%to, subject = message.subject.as_deref().unwrap_or(""), "email (log only)");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
