use std::sync::Arc;

use serde_json::{json, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::{AlertState, EvalContext};
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "slack",
        name: "Slack",
        heading: "Slack settings",
        description: "Sends notifications to Slack",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(SlackNotifier::new(config, transport)?))
}

pub struct SlackNotifier {
    base: NotifierBase,
    url: String,
    recipient: Option<String>,
    username: Option<String>,
    icon_emoji: Option<String>,
    icon_url: Option<String>,
    mention_users: Vec<String>,
    mention_channel: Option<String>,
    token: Option<String>,
}

impl SlackNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let token = settings.str("token");
        // a bot token posts through the Web API, so the webhook url is optional
        let url = match settings.str("url") {
            Some(_) => settings.url("url")?,
            None if token.is_some() => POST_MESSAGE_URL.to_string(),
            None => return Err(ValidationError::MissingSetting("url".into())),
        };

        let mention_channel = settings.str("mentionChannel");
        if let Some(mc) = &mention_channel {
            if mc != "here" && mc != "channel" {
                return Err(ValidationError::invalid("mentionChannel", format!("unknown value '{mc}'")));
            }
        }

        Ok(Self {
            base,
            url,
            recipient: settings.str("recipient"),
            username: settings.str("username"),
            icon_emoji: settings.str("icon_emoji"),
            icon_url: settings.str("icon_url"),
            mention_users: settings.string_list("mentionUsers"),
            mention_channel,
            token,
        })
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let state = ctx.state_model();
        let fields: Vec<Value> = match_lines(ctx)
            .into_iter()
            .map(|(metric, value)| json!({ "title": metric, "value": value, "short": true }))
            .collect();

        let mut attachment = json!({
            "color": state.color,
            "title": ctx.notification_title(),
            "title_link": ctx.rule_url(),
            "text": ctx.rule.message,
            "fallback": ctx.notification_title(),
            "fields": fields,
            "footer": "Sentinel",
            "ts": ctx.end_time.unwrap_or(ctx.start_time).timestamp(),
        });
        if let (Some(err), Some(fields)) = (&ctx.error, attachment["fields"].as_array_mut()) {
            fields.push(json!({ "title": "Error message", "value": err.to_string(), "short": false }));
        }
        if let Some(url) = &ctx.image_public_url {
            attachment["image_url"] = json!(url);
        }

        let mut body = json!({
            "parse": "full",
            "attachments": [attachment],
        });
        if ctx.rule.state == AlertState::Alerting {
            let mut mentions: Vec<String> = self.mention_users.iter().map(|u| format!("<@{u}>")).collect();
            if let Some(mc) = &self.mention_channel {
                mentions.push(format!("<!{mc}|{mc}>"));
            }
            if !mentions.is_empty() {
                body["text"] = json!(mentions.join(" "));
            }
        }
        if let Some(r) = &self.recipient {
            body["channel"] = json!(r);
        }
        if let Some(u) = &self.username {
            body["username"] = json!(u);
        }
        if let Some(e) = &self.icon_emoji {
            body["icon_emoji"] = json!(e);
        }
        if let Some(i) = &self.icon_url {
            body["icon_url"] = json!(i);
        }
        body
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending slack notification");

        let mut req = WebhookRequest::json(&self.url, &self.payload(ctx))?;
        if let Some(token) = &self.token {
            req.headers.insert("Authorization".into(), format!("Bearer {token}"));
        }
        self.base.transport.send_webhook(req).await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}
