//! Outbound mail

use async_trait::async_trait;

use crate::error::Result;

/// Delivers a plain-text message
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Mailer that only writes the message to the log. Stands in for SMTP
/// delivery in development.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        log::info!("Mail to {} subject={:?} body={:?}", to, subject, body);
        Ok(())
    }
}
