use std::fmt::Write;
use std::sync::Arc;

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::EvalContext;
use crate::error::{NotifyError, ValidationError};
use crate::notify::{EmailMessage, Transport};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "email",
        name: "Email",
        heading: "Email settings",
        description: "Sends notifications using the configured SMTP server",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(EmailNotifier::new(config, transport)?))
}

pub struct EmailNotifier {
    base: NotifierBase,
    addresses: Vec<String>,
    single_email: bool,
}

impl EmailNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let addresses = split_addresses(&settings.required_str("addresses")?);
        if addresses.is_empty() {
            return Err(ValidationError::MissingSetting("addresses".into()));
        }
        for addr in &addresses {
            addr.parse::<lettre::Address>()
                .map_err(|e| ValidationError::invalid("addresses", format!("{addr}: {e}")))?;
        }

        Ok(Self {
            base,
            addresses,
            single_email: settings.bool_or("singleEmail", false),
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    fn body(&self, ctx: &EvalContext) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "{}", ctx.notification_title());
        if !ctx.rule.message.is_empty() {
            let _ = writeln!(body, "\n{}", ctx.rule.message);
        }
        if let Some(err) = &ctx.error {
            let _ = writeln!(body, "\nError: {err}");
        }
        let matches = match_lines(ctx);
        if !matches.is_empty() {
            let _ = writeln!(body, "\nMetrics:");
            for (metric, value) in matches {
                let _ = writeln!(body, "  {metric}: {value}");
            }
        }
        if let Some(url) = &ctx.image_public_url {
            let _ = writeln!(body, "\nImage: {url}");
        }
        let _ = writeln!(body, "\n{}", ctx.rule_url());
        body
    }
}

/// Splits on comma, semicolon and newline, dropping blanks.
fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == ';' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, recipients = self.addresses.len(), "sending email");

        let attachment = match (&ctx.image_public_url, &ctx.image_on_disk_path) {
            (None, Some(path)) => Some(path.clone()),
            _ => None,
        };

        self.base
            .transport
            .send_email(EmailMessage {
                to: self.addresses.clone(),
                subject: ctx.notification_title(),
                body: self.body(ctx),
                single_email: self.single_email,
                attachment,
            })
            .await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use crate::notifier::testing::{config, ctx, RecordingTransport};
    use serde_json::json;

    #[test]
    fn missing_addresses_rejected() {
        let err = EmailNotifier::new(&config("email", json!({})), RecordingTransport::new())
            .err()
            .unwrap();
        assert_eq!(err, ValidationError::MissingSetting("addresses".into()));
    }

    #[test]
    fn splits_addresses() {
        let n = EmailNotifier::new(
            &config("email", json!({ "addresses": "a@b.com,c@d.com" })),
            RecordingTransport::new(),
        )
        .unwrap();
        assert_eq!(n.addresses(), ["a@b.com", "c@d.com"]);

        assert_eq!(split_addresses("a@b.com; c@d.com\ne@f.com,,"), vec!["a@b.com", "c@d.com", "e@f.com"]);
    }

    #[test]
    fn malformed_address_rejected() {
        let err = EmailNotifier::new(
            &config("email", json!({ "addresses": "a@b.com,not-an-address" })),
            RecordingTransport::new(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("not-an-address"));
    }

    #[tokio::test]
    async fn sends_through_transport() {
        let t = RecordingTransport::new();
        let n = EmailNotifier::new(
            &config("email", json!({ "addresses": "ops@example.com", "singleEmail": true })),
            t.clone(),
        )
        .unwrap();
        n.notify(&ctx(AlertState::Ok, AlertState::Alerting)).await.unwrap();

        let sent = t.emails.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[Alerting] High CPU");
        assert!(sent[0].single_email);
        assert!(sent[0].body.contains("cpu{host=web-1}: 97.5"));
        assert!(sent[0].body.contains("http://sentinel.local/alerting/rules/12?orgId=1"));
    }
}
