use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::{Client, Method};
use serde::Deserialize;

use crate::error::NotifyError;

#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub http_method: Method,
    pub body: String,
    pub content_type: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl WebhookRequest {
    pub fn json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self, NotifyError> {
        Ok(Self {
            url: url.into(),
            http_method: Method::POST,
            body: serde_json::to_string(body)?,
            content_type: "application/json".into(),
            user: None,
            password: None,
            headers: BTreeMap::new(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// One message addressed to every recipient instead of one per address.
    pub single_email: bool,
    pub attachment: Option<PathBuf>,
}

/// Outbound delivery shared by every notifier. Implementations do not retry.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_webhook(&self, req: WebhookRequest) -> Result<(), NotifyError>;
    async fn send_email(&self, msg: EmailMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Sentinel".into()
}

pub struct HttpTransport {
    client: Client,
    smtp: Option<(AsyncSmtpTransport<Tokio1Executor>, String)>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, smtp: Option<&SmtpConfig>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sentinel-alerting/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::Payload(e.to_string()))?;

        let smtp = match smtp {
            Some(cfg) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                    .map_err(|e| NotifyError::Email(e.to_string()))?
                    .port(cfg.port)
                    .timeout(Some(timeout));
                if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                let from = format!("{} <{}>", cfg.from_name, cfg.from_address);
                Some((builder.build(), from))
            }
            None => None,
        };

        Ok(Self { client, smtp })
    }

    async fn build_email(
        from: &str,
        to: &[String],
        msg: &EmailMessage,
    ) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(from.parse().map_err(|e: lettre::address::AddressError| NotifyError::Email(e.to_string()))?)
            .subject(msg.subject.clone());
        for addr in to {
            builder = builder.to(addr
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::Email(e.to_string()))?);
        }

        let text = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(msg.body.clone());

        let message = match &msg.attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| NotifyError::Email(format!("attachment {}: {e}", path.display())))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image.png".into());
                let png = ContentType::parse("image/png").map_err(|e| NotifyError::Email(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(text)
                        .singlepart(Attachment::new(filename).body(bytes, png)),
                )
            }
            None => builder.singlepart(text),
        };

        message.map_err(|e| NotifyError::Email(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send_webhook(&self, req: WebhookRequest) -> Result<(), NotifyError> {
        let mut builder = self
            .client
            .request(req.http_method.clone(), &req.url)
            .header(reqwest::header::CONTENT_TYPE, &req.content_type)
            .body(req.body);
        if let Some(user) = &req.user {
            builder = builder.basic_auth(user, req.password.as_ref());
        }
        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }

        let webhook_err = |reason: String| NotifyError::Webhook {
            url: req.url.clone(),
            reason,
        };

        let resp = builder.send().await.map_err(|e| webhook_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(url = %req.url, status = %status, body = %body, "webhook rejected");
            return Err(webhook_err(format!("status {status}")));
        }
        Ok(())
    }

    async fn send_email(&self, msg: EmailMessage) -> Result<(), NotifyError> {
        let (mailer, from) = self.smtp.as_ref().ok_or(NotifyError::TransportDisabled)?;

        let batches: Vec<Vec<String>> = if msg.single_email {
            vec![msg.to.clone()]
        } else {
            msg.to.iter().map(|a| vec![a.clone()]).collect()
        };

        let msg = &msg;
        send_each(batches, move |to| async move {
            let message = Self::build_email(from, &to, msg).await?;
            mailer
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| NotifyError::Email(e.to_string()))
        })
        .await
    }
}

/// Sends every batch even when an earlier one fails and reports the first
/// failure.
async fn send_each<F, Fut>(batches: Vec<Vec<String>>, mut send: F) -> Result<(), NotifyError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<(), NotifyError>>,
{
    let mut first_err = None;
    for to in batches {
        let recipients = to.join(", ");
        if let Err(e) = send(to).await {
            tracing::warn!(to = %recipients, error = %e, "email delivery failed");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Rejects every delivery. Used when notifiers are only built for validation.
pub struct DisabledTransport;

#[async_trait::async_trait]
impl Transport for DisabledTransport {
    async fn send_webhook(&self, _req: WebhookRequest) -> Result<(), NotifyError> {
        Err(NotifyError::TransportDisabled)
    }

    async fn send_email(&self, _msg: EmailMessage) -> Result<(), NotifyError> {
        Err(NotifyError::TransportDisabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_request_defaults() {
        let req = WebhookRequest::json("http://hook", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(req.http_method, Method::POST);
        assert_eq!(req.content_type, "application/json");
        assert_eq!(req.body, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn email_without_smtp_is_disabled() {
        let t = HttpTransport::new(Duration::from_secs(1), None).unwrap();
        let err = t
            .send_email(EmailMessage {
                to: vec!["a@b.com".into()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::TransportDisabled));
    }

    #[tokio::test]
    async fn disabled_transport_rejects() {
        let req = WebhookRequest::json("http://hook", &serde_json::json!({})).unwrap();
        assert!(DisabledTransport.send_webhook(req).await.is_err());
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_stop_the_rest() {
        let attempted = std::sync::Mutex::new(Vec::new());
        let batches = vec![vec!["a@b.com".to_string()], vec!["c@d.com".to_string()], vec!["e@f.com".to_string()]];

        let err = send_each(batches, |to| {
            attempted.lock().unwrap().push(to[0].clone());
            async move {
                if to[0] == "e@f.com" {
                    Ok(())
                } else {
                    Err(NotifyError::Email(format!("rejected {}", to[0])))
                }
            }
        })
        .await
        .unwrap_err();

        assert_eq!(*attempted.lock().unwrap(), vec!["a@b.com", "c@d.com", "e@f.com"]);
        assert!(matches!(err, NotifyError::Email(reason) if reason == "rejected a@b.com"));
    }

    #[tokio::test]
    async fn builds_multi_recipient_email() {
        let msg = EmailMessage {
            to: vec!["a@b.com".into(), "c@d.com".into()],
            subject: "[Alerting] cpu".into(),
            body: "hot".into(),
            single_email: true,
            attachment: None,
        };
        let m = HttpTransport::build_email("Sentinel <alerts@sentinel.local>", &msg.to, &msg)
            .await
            .unwrap();
        assert_eq!(m.envelope().to().len(), 2);
    }
}
