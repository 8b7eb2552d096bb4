use std::sync::Arc;

use serde_json::{json, Value};

use super::{Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::{AlertState, EvalContext};
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

const DEFAULT_API_URL: &str = "https://api.opsgenie.com/v2/alerts";
const PRIORITY_TAG: &str = "og_priority";

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "opsgenie",
        name: "OpsGenie",
        heading: "OpsGenie settings",
        description: "Sends notifications to OpsGenie",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(OpsGenieNotifier::new(config, transport)?))
}

pub struct OpsGenieNotifier {
    base: NotifierBase,
    api_key: String,
    api_url: String,
    auto_close: bool,
    override_priority: bool,
}

impl OpsGenieNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let api_url = match settings.str("apiUrl") {
            Some(_) => settings.url("apiUrl")?,
            None => DEFAULT_API_URL.to_string(),
        };

        Ok(Self {
            base,
            api_key: settings.required_str("apiKey")?,
            api_url: api_url.trim_end_matches('/').to_string(),
            auto_close: settings.bool_or("autoClose", true),
            override_priority: settings.bool_or("overridePriority", true),
        })
    }

    fn alias(ctx: &EvalContext) -> String {
        format!("alertId-{}", ctx.rule.id)
    }

    fn create_body(&self, ctx: &EvalContext) -> Value {
        let mut description = format!("{} - {}\n{}", ctx.rule.name, ctx.rule_url(), ctx.rule.message);
        if let Some(url) = &ctx.image_public_url {
            description.push_str(&format!("\n{url}"));
        }

        let tags: Vec<String> = ctx
            .rule
            .tags
            .iter()
            .filter(|(k, _)| k.as_str() != PRIORITY_TAG)
            .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}:{v}") })
            .collect();

        let mut body = json!({
            "message": ctx.notification_title(),
            "source": "Sentinel",
            "alias": Self::alias(ctx),
            "description": description,
            "tags": tags,
            "details": { "url": ctx.rule_url() },
        });

        if self.override_priority {
            if let Some(p) = ctx.rule.tags.get(PRIORITY_TAG) {
                if matches!(p.as_str(), "P1" | "P2" | "P3" | "P4" | "P5") {
                    body["priority"] = json!(p);
                }
            }
        }
        body
    }

    fn request(&self, url: String, body: &Value) -> Result<WebhookRequest, NotifyError> {
        let mut req = WebhookRequest::json(url, body)?;
        req.headers.insert("Authorization".into(), format!("GenieKey {}", self.api_key));
        Ok(req)
    }
}

#[async_trait::async_trait]
impl Notifier for OpsGenieNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        let req = match ctx.rule.state {
            AlertState::Alerting => {
                tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "creating opsgenie alert");
                self.request(self.api_url.clone(), &self.create_body(ctx))?
            }
            AlertState::Ok if self.auto_close => {
                tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "closing opsgenie alert");
                let url = format!("{}/{}/close?identifierType=alias", self.api_url, Self::alias(ctx));
                self.request(url, &json!({ "source": "Sentinel" }))?
            }
            _ => return Ok(()),
        };
        self.base.transport.send_webhook(req).await
    }

    fn base(&self) -> &NotifierBase {
        &self.base
    }
}
