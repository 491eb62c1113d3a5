use super::models::MailMessage;
use anyhow::{bail, Context, Result};
use base64::Engine;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Outbound mail capability. Implementations are called from a blocking
/// context.
pub trait MailTransport: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<()>;

    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content_base64: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    attachments: Vec<RelayAttachment<'a>>,
}

/// Delivers messages by posting them to a pre-configured mail relay.
pub struct HttpMailTransport {
    relay_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpMailTransport {
    pub fn new(relay_url: String, auth_token: Option<String>, timeout_sec: u64) -> Self {
        Self {
            relay_url,
            auth_token,
            timeout: Duration::from_secs(timeout_sec),
        }
    }

    fn payload<'a>(message: &'a MailMessage) -> RelayPayload<'a> {
        RelayPayload {
            from: &message.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
            attachments: message
                .attachments
                .iter()
                .map(|a| RelayAttachment {
                    filename: &a.file_name,
                    content_type: &a.content_type,
                    content_base64: base64::engine::general_purpose::STANDARD.encode(&a.content),
                })
                .collect(),
        }
    }
}

impl MailTransport for HttpMailTransport {
    fn send(&self, message: &MailMessage) -> Result<()> {
        // Built per send: the blocking client must not be dropped inside the async runtime.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to build mail relay client")?;

        let mut request = client.post(&self.relay_url).json(&Self::payload(message));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(
            "Posting message '{}' to mail relay {}",
            message.subject, self.relay_url
        );
        let response = request
            .send()
            .with_context(|| format!("Mail relay {} unreachable", self.relay_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("Mail relay rejected message with status {}: {}", status, body);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Logs messages instead of sending them. Used when no relay is configured.
pub struct LogOnlyTransport;

impl MailTransport for LogOnlyTransport {
    fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            "Mail relay not configured, logging message to {:?}: {} ({} attachments)",
            message.to,
            message.subject,
            message.attachments.len()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::Attachment;

    fn message() -> MailMessage {
        MailMessage {
            from: "backup@workdesk.local".to_string(),
            to: vec!["ops@example.com".to_string()],
            subject: "Subject".to_string(),
            body: "Body".to_string(),
            attachments: vec![Attachment {
                file_name: "users.csv".to_string(),
                content_type: "text/csv".to_string(),
                content: b"id\n1\n".to_vec(),
            }],
        }
    }

    #[test]
    fn test_relay_payload_encodes_attachments() {
        let message = message();
        let json = serde_json::to_value(HttpMailTransport::payload(&message)).unwrap();

        assert_eq!(json["to"][0], "ops@example.com");
        assert_eq!(json["text"], "Body");
        assert_eq!(json["attachments"][0]["filename"], "users.csv");
        assert_eq!(json["attachments"][0]["content_base64"], "aWQKMQo=");
    }

    #[test]
    fn test_unreachable_relay_is_an_error() {
        let transport = HttpMailTransport::new("http://127.0.0.1:9/send".to_string(), None, 2);
        assert!(transport.send(&message()).is_err());
    }

    #[test]
    fn test_log_only_transport_always_succeeds() {
        assert!(LogOnlyTransport.send(&message()).is_ok());
    }
}
