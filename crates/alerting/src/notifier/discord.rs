use std::sync::Arc;

use serde_json::{json, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::EvalContext;
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "discord",
        name: "Discord",
        heading: "Discord settings",
        description: "Sends notifications to Discord",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(DiscordNotifier::new(config, transport)?))
}

pub struct DiscordNotifier {
    base: NotifierBase,
    url: String,
    content: Option<String>,
    avatar_url: Option<String>,
    use_discord_username: bool,
}

impl DiscordNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);
        Ok(Self {
            base,
            url: settings.url("url")?,
            content: settings.str("content"),
            avatar_url: settings.str("avatar_url"),
            use_discord_username: settings.bool_or("use_discord_username", false),
        })
    }

    fn color(ctx: &EvalContext) -> u32 {
        u32::from_str_radix(ctx.state_model().color.trim_start_matches('#'), 16).unwrap_or(0)
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let mut fields: Vec<Value> = match_lines(ctx)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value, "inline": true }))
            .collect();
        if let Some(err) = &ctx.error {
            fields.push(json!({ "name": "Error message", "value": err.to_string(), "inline": false }));
        }

        let mut embed = json!({
            "title": ctx.notification_title(),
            "url": ctx.rule_url(),
            "color": Self::color(ctx),
            "fields": fields,
            "footer": { "text": "Sentinel" },
            "timestamp": ctx.end_time.unwrap_or(ctx.start_time).to_rfc3339(),
        });
        if !ctx.rule.message.is_empty() {
            embed["description"] = json!(ctx.rule.message);
        }
        if let Some(url) = &ctx.image_public_url {
            embed["image"] = json!({ "url": url });
        }

        let mut body = json!({ "embeds": [embed] });
        if !self.use_discord_username {
            body["username"] = json!("Sentinel");
        }
        if let Some(c) = &self.content {
            body["content"] = json!(c);
        }
        if let Some(a) = &self.avatar_url {
            body["avatar_url"] = json!(a);
        }
        body
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending discord notification");
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

    #[tokio::test]
    async fn embed_carries_state_colour() {
        let t = RecordingTransport::new();
        let cfg = config("discord", json!({ "url": "https://discord.com/api/webhooks/1/x", "content": "@here" }));
        DiscordNotifier::new(&cfg, t.clone())
            .unwrap()
            .notify(&ctx(AlertState::Ok, AlertState::Alerting))
            .await
            .unwrap();

        let body = t.last_body();
        assert_eq!(body["content"], "@here");
        assert_eq!(body["username"], "Sentinel");
        let embed = &body["embeds"][0];
        assert_eq!(embed["color"], 0xD63232);
        assert_eq!(embed["fields"][0]["name"], "cpu{host=web-1}");
        assert_eq!(embed["description"], "CPU above 90%");
    }

    #[test]
    fn requires_url() {
        assert!(DiscordNotifier::new(&config("discord", json!({})), RecordingTransport::new()).is_err());
    }
}
