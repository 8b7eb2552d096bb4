use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{match_lines, Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::{AlertState, EvalContext};
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "sensu",
        name: "Sensu",
        heading: "Sensu settings",
        description: "Sends HTTP POST request to a Sensu API",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(SensuNotifier::new(config, transport)?))
}

pub struct SensuNotifier {
    base: NotifierBase,
    url: String,
    source: Option<String>,
    handler: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl SensuNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);
        Ok(Self {
            base,
            url: settings.url("url")?,
            source: settings.str("source"),
            handler: settings.str("handler"),
            user: settings.str("username"),
            password: settings.str("password"),
        })
    }

    /// Sensu check status: 0 OK, 1 warning, 2 critical, 3 unknown.
    fn status(state: AlertState) -> u8 {
        match state {
            AlertState::Ok => 0,
            AlertState::NoData => 1,
            AlertState::Alerting => 2,
            _ => 3,
        }
    }

    fn payload(&self, ctx: &EvalContext) -> Value {
        let metrics: Map<String, Value> = match_lines(ctx)
            .into_iter()
            .map(|(metric, value)| (metric, json!(value)))
            .collect();

        let source = self
            .source
            .clone()
            .unwrap_or_else(|| format!("sentinel_rule_{}", ctx.rule.id));

        let mut body = json!({
            "ruleId": ctx.rule.id,
            "name": ctx.rule.name,
            "source": source,
            "status": Self::status(ctx.rule.state),
            "output": ctx.rule.message,
            "ruleUrl": ctx.rule_url(),
            "metrics": metrics,
        });
        if let Some(h) = &self.handler {
            body["handler"] = json!(h);
        }
        if let Some(url) = &ctx.image_public_url {
            body["imageUrl"] = json!(url);
        }
        body
    }
}

#[async_trait::async_trait]
impl Notifier for SensuNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, "sending sensu result");
        let mut req = WebhookRequest::json(&self.url, &self.payload(ctx))?;
        req.user = self.user.clone();
        req.password = self.password.clone();
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

    #[test]
    fn status_codes() {
        assert_eq!(SensuNotifier::status(AlertState::Ok), 0);
        assert_eq!(SensuNotifier::status(AlertState::NoData), 1);
        assert_eq!(SensuNotifier::status(AlertState::Alerting), 2);
        assert_eq!(SensuNotifier::status(AlertState::Unknown), 3);
    }

    #[tokio::test]
    async fn posts_check_result_with_auth() {
        let t = RecordingTransport::new();
        let cfg = config(
            "sensu",
            json!({ "url": "http://sensu:4567/results", "handler": "pager", "username": "u", "password": "p" }),
        );
        SensuNotifier::new(&cfg, t.clone())
            .unwrap()
            .notify(&ctx(AlertState::Ok, AlertState::Alerting))
            .await
            .unwrap();

        let req = t.last_webhook();
        assert_eq!(req.user.as_deref(), Some("u"));
        assert_eq!(req.password.as_deref(), Some("p"));
        let body = t.last_body();
        assert_eq!(body["status"], 2);
        assert_eq!(body["source"], "sentinel_rule_12");
        assert_eq!(body["handler"], "pager");
        assert_eq!(body["metrics"]["cpu{host=web-1}"], "97.5");
    }
}
