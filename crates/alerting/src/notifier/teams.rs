use std::sync::Arc;

use serde_json::{json, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::EvalContext;
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "teams",
        name: "Microsoft Teams",
        heading: "Teams settings",
        description: "Sends notifications using an incoming webhook connector to Microsoft Teams",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(TeamsNotifier::new(config, transport)?))
}

pub struct TeamsNotifier {
    base: NotifierBase,
    url: String,
}

impl TeamsNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let url = Settings::new(&config.settings).url("url")?;
        Ok(Self { base, url })
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let facts: Vec<Value> = match_lines(ctx)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();

        let mut message = ctx.rule.message.clone();
        if let Some(err) = &ctx.error {
            message = format!("{message}\n\nError message: {err}");
        }

        let mut section = json!({
            "title": "Details",
            "facts": facts,
            "text": message,
        });
        if let Some(url) = &ctx.image_public_url {
            section["images"] = json!([{ "image": url }]);
        }

        json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "summary": ctx.notification_title(),
            "title": ctx.notification_title(),
            "themeColor": ctx.state_model().color.trim_start_matches('#'),
            "sections": [section],
            "potentialAction": [{
                "@context": "http://schema.org",
                "@type": "OpenUri",
                "name": "View Rule",
                "targets": [{ "os": "default", "uri": ctx.rule_url() }],
            }],
        })
    }
}

#[async_trait::async_trait]
impl Notifier for TeamsNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending teams notification");
        let req = WebhookRequest::json(&self.url, &self.payload(ctx))?;
        self.base.transport.send_webhook(req).await
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

    #[test]
    fn requires_url() {
        assert!(TeamsNotifier::new(&config("teams", json!({})), RecordingTransport::new()).is_err());
    }

    #[tokio::test]
    async fn builds_message_card() {
        let t = RecordingTransport::new();
        let n = TeamsNotifier::new(&config("teams", json!({ "url": "https://outlook.office.com/webhook/x" })), t.clone())
            .unwrap();
        n.notify(&ctx(AlertState::Ok, AlertState::Alerting)).await.unwrap();

        let body = t.last_body();
        assert_eq!(body["@type"], "MessageCard");
        assert_eq!(body["themeColor"], "D63232");
        assert_eq!(body["sections"][0]["facts"][0]["value"], "97.5");
        assert_eq!(
            body["potentialAction"][0]["targets"][0]["uri"],
            "http://sentinel.local/alerting/rules/12?orgId=1"
        );
    }
}
