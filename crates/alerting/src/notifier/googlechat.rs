use std::sync::Arc;

use serde_json::{json, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::EvalContext;
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "googlechat",
        name: "Google Hangouts Chat",
        heading: "Google Hangouts Chat settings",
        description: "Sends notifications to Google Hangouts Chat via webhooks",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(GoogleChatNotifier::new(config, transport)?))
}

pub struct GoogleChatNotifier {
    base: NotifierBase,
    url: String,
}

impl GoogleChatNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let url = Settings::new(&config.settings).url("url")?;
        Ok(Self { base, url })
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let mut widgets = Vec::new();
        if !ctx.rule.message.is_empty() {
            widgets.push(json!({ "textParagraph": { "text": ctx.rule.message } }));
        }
        if let Some(err) = &ctx.error {
            widgets.push(json!({ "textParagraph": { "text": format!("<b>Error:</b> {err}") } }));
        }
        for (metric, value) in match_lines(ctx) {
            widgets.push(json!({ "textParagraph": { "text": format!("<i>{metric}: {value}</i>") } }));
        }
        if let Some(url) = &ctx.image_public_url {
            widgets.push(json!({ "image": { "imageUrl": url } }));
        }
        widgets.push(json!({
            "buttons": [{
                "textButton": {
                    "text": "OPEN IN SENTINEL",
                    "onClick": { "openLink": { "url": ctx.rule_url() } },
                }
            }]
        }));
        widgets.push(json!({
            "textParagraph": {
                "text": format!("Sentinel | {}", ctx.end_time.unwrap_or(ctx.start_time).format("%Y-%m-%d %H:%M:%S UTC")),
            }
        }));

        let title = ctx.notification_title();
        json!({
            "previewText": title,
            "fallbackText": title,
            "cards": [{
                "header": { "title": title },
                "sections": [{ "widgets": widgets }],
            }],
        })
    }
}

#[async_trait::async_trait]
impl Notifier for GoogleChatNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending google chat card");
        let req = WebhookRequest::json(&self.url, &self.payload(ctx))?;
        self.base.transport.send_webhook(req).await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}
