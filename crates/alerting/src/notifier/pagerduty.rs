use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::{AlertState, EvalContext};
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";
const MAX_SUMMARY_LEN: usize = 1024;
const SEVERITIES: [&str; 4] = ["critical", "error", "warning", "info"];

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "pagerduty",
        name: "PagerDuty",
        heading: "PagerDuty settings",
        description: "Sends notifications to PagerDuty",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(PagerDutyNotifier::new(config, transport)?))
}

pub struct PagerDutyNotifier {
    base: NotifierBase,
    routing_key: String,
    severity: String,
    auto_resolve: bool,
    message_in_details: bool,
}

impl PagerDutyNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let severity = settings.str_or("severity", "critical");
        if !SEVERITIES.contains(&severity.as_str()) {
            return Err(ValidationError::invalid("severity", format!("unknown severity '{severity}'")));
        }

        Ok(Self {
            base,
            routing_key: settings.required_str("integrationKey")?,
            severity,
            auto_resolve: settings.bool_or("autoResolve", true),
            message_in_details: settings.bool_or("messageInDetails", false),
        })
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let event_action = if ctx.rule.state == AlertState::Ok {
            "resolve"
        } else {
            "trigger"
        };

        let mut details = Map::new();
        for (metric, value) in match_lines(ctx) {
            details.insert(metric, json!(value));
        }
        details.insert("state".into(), json!(ctx.rule.state.as_str()));

        let mut summary = ctx.notification_title();
        if self.message_in_details {
            details.insert("message".into(), json!(ctx.rule.message));
        } else if !ctx.rule.message.is_empty() {
            summary = format!("{summary} - {}", ctx.rule.message);
        }
        let summary: String = summary.chars().take(MAX_SUMMARY_LEN).collect();

        let mut body = json!({
            "routing_key": self.routing_key,
            "event_action": event_action,
            "dedup_key": format!("alertId-{}", ctx.rule.id),
            "client": "Sentinel",
            "client_url": ctx.rule_url(),
            "links": [{ "href": ctx.rule_url(), "text": "View rule" }],
            "payload": {
                "summary": summary,
                "source": "sentinel",
                "severity": self.severity,
                "timestamp": ctx.end_time.unwrap_or(ctx.start_time).to_rfc3339(),
                "component": "Sentinel",
                "group": ctx.rule.tags.get("group"),
                "class": ctx.rule.tags.get("class"),
                "custom_details": details,
            },
        });
        if let Some(url) = &ctx.image_public_url {
            body["images"] = json!([{ "src": url }]);
        }
        body
    }
}

#[async_trait::async_trait]
impl Notifier for PagerDutyNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        if ctx.rule.state == AlertState::Ok && !self.auto_resolve {
            tracing::info!(notifier = %self.base.name, "auto resolve disabled, not sending resolve event");
            return Ok(());
        }

        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "notifying pagerduty");
        let req = WebhookRequest::json(EVENTS_URL, &self.payload(ctx))?;
        self.base.transport.send_webhook(req).await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}
