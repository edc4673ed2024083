use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::mail::{Email, Mailer};

/// Delivers mail through a JSON HTTP mail API (Resend/Mailgun style:
/// bearer key, one POST per message).
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: Option<String>, api_key: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let url = match &self.api_url {
            Some(u) => u,
            None => {
                // No transport configured: log and drop (dev mode).
                tracing::debug!(to = %email.to, subject = %email.subject, "No mail API configured, dropping mail");
                return Ok(());
            }
        };

        let message = OutboundMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: email.render(),
        };

        let mut req = self.client.post(url).json(&message);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("failed to reach mail API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail API returned error: status={}, body={}", status, body);
        }

        tracing::info!(to = %email.to, subject = %email.subject, "mail delivered");
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}
