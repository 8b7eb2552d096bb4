use std::sync::Arc;

use reqwest::Method;

use super::{Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::{AlertState, EvalContext};
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

const SEND_URL: &str = "https://msgapi.threema.ch/send_simple";

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "threema",
        name: "Threema Gateway",
        heading: "Threema Gateway settings",
        description: "Sends notifications to Threema using Threema Gateway (Basic IDs)",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(ThreemaNotifier::new(config, transport)?))
}

pub struct ThreemaNotifier {
    base: NotifierBase,
    gateway_id: String,
    recipient_id: String,
    api_secret: String,
}

impl ThreemaNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let gateway_id = settings.required_str("gateway_id")?;
        if !gateway_id.starts_with('*') {
            return Err(ValidationError::invalid("gateway_id", "must start with a *"));
        }
        if gateway_id.chars().count() != 8 {
            return Err(ValidationError::invalid("gateway_id", "must be 8 characters long"));
        }

        let recipient_id = settings.required_str("recipient_id")?;
        if recipient_id.chars().count() != 8 {
            return Err(ValidationError::invalid("recipient_id", "must be 8 characters long"));
        }

        Ok(Self {
            base,
            gateway_id,
            recipient_id,
            api_secret: settings.required_str("api_secret")?,
        })
    }

    fn text(ctx: &EvalContext) -> String {
        let icon = match ctx.rule.state {
            AlertState::Ok => "\u{2705}",
            AlertState::NoData => "\u{2753}",
            AlertState::Alerting => "\u{26A0}\u{FE0F}",
            _ => "\u{2139}\u{FE0F}",
        };
        let mut text = format!("{icon} {}\n\n", ctx.notification_title());
        if !ctx.rule.message.is_empty() {
            text.push_str(&format!("*Message:*\n{}\n", ctx.rule.message));
        }
        text.push_str(&format!("*URL:* {}\n", ctx.rule_url()));
        if let Some(url) = &ctx.image_public_url {
            text.push_str(&format!("*Image:* {url}\n"));
        }
        text
    }

    fn form(&self, ctx: &EvalContext) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("from", &self.gateway_id)
            .append_pair("to", &self.recipient_id)
            .append_pair("secret", &self.api_secret)
            .append_pair("text", &Self::text(ctx))
            .finish()
    }
}

#[async_trait::async_trait]
impl Notifier for ThreemaNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending threema message");
        let req = WebhookRequest {
            url: SEND_URL.into(),
            http_method: Method::POST,
            body: self.form(ctx),
            content_type: "application/x-www-form-urlencoded".into(),
            user: None,
            password: None,
            headers: Default::default(),
        };
        self.base.transport.send_webhook(req).await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::{config, ctx, RecordingTransport};
    use serde_json::json;

    fn settings(gateway: &str, recipient: &str) -> serde_json::Value {
        json!({ "gateway_id": gateway, "recipient_id": recipient, "api_secret": "s3cret" })
    }

    #[test]
    fn validates_ids() {
        let t = RecordingTransport::new();
        assert!(ThreemaNotifier::new(&config("threema", settings("*3MAGWID", "ECHOECHO")), t.clone()).is_ok());

        let err = ThreemaNotifier::new(&config("threema", settings("3MAGWIDX", "ECHOECHO")), t.clone())
            .err()
            .unwrap();
        assert!(err.to_string().contains("must start with a *"));

        assert!(ThreemaNotifier::new(&config("threema", settings("*3MA", "ECHOECHO")), t.clone()).is_err());
        assert!(ThreemaNotifier::new(&config("threema", settings("*3MAGWID", "ECHO")), t.clone()).is_err());
        assert!(ThreemaNotifier::new(
            &config("threema", json!({ "gateway_id": "*3MAGWID", "recipient_id": "ECHOECHO" })),
            t
        )
        .is_err());
    }

    #[tokio::test]
    async fn sends_form_encoded() {
        let t = RecordingTransport::new();
        let n = ThreemaNotifier::new(&config("threema", settings("*3MAGWID", "ECHOECHO")), t.clone()).unwrap();
        n.notify(&ctx(AlertState::Ok, AlertState::Alerting)).await.unwrap();

        let req = t.last_webhook();
        assert_eq!(req.url, SEND_URL);
        assert_eq!(req.content_type, "application/x-www-form-urlencoded");
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(req.body.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(pairs[0], ("from".to_string(), "*3MAGWID".to_string()));
        assert_eq!(pairs[1], ("to".to_string(), "ECHOECHO".to_string()));
        assert!(pairs[3].1.contains("[Alerting] High CPU"));
    }
}
