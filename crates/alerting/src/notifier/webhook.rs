use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use sentinel_common::crypto::{sign_data, SIGNATURE_HEADER};

use super::{Notifier, NotifierBase, NotifierDescriptor, Settings};
use crate::alert::EvalContext;
use crate::error::{NotifyError, ValidationError};
use crate::notify::{Transport, WebhookRequest};
use crate::store::NotificationConfig;

pub(super) fn descriptor() -> NotifierDescriptor {
    NotifierDescriptor {
        type_name: "webhook",
        name: "webhook",
        heading: "Webhook settings",
        description: "Sends HTTP POST request to a URL",
        factory: Arc::new(build),
    }
}

fn build(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Box<dyn Notifier>, ValidationError> {
    Ok(Box::new(WebhookNotifier::new(config, transport)?))
}

pub struct WebhookNotifier {
    base: NotifierBase,
    url: String,
    method: Method,
    user: Option<String>,
    password: Option<String>,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        let base = NotifierBase::new(config, transport)?;
        let settings = Settings::new(&config.settings);

        let method = match settings.str_or("httpMethod", "POST").to_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            other => {
                return Err(ValidationError::invalid("httpMethod", format!("unsupported method '{other}'")))
            }
        };

        Ok(Self {
            base,
            url: settings.url("url")?,
            method,
            user: settings.str("username"),
            password: settings.str("password"),
            secret: settings.str("secret"),
        })
    }

    fn payload(ctx: &EvalContext) -> Value {
        let mut body = json!({
            "title": ctx.notification_title(),
            "ruleId": ctx.rule.id,
            "ruleName": ctx.rule.name,
            "state": ctx.rule.state,
            "evalMatches": ctx.eval_matches,
            "orgId": ctx.rule.org_id,
            "dashboardId": ctx.rule.dashboard_id,
            "panelId": ctx.rule.panel_id,
            "tags": ctx.rule.tags,
            "ruleUrl": ctx.rule_url(),
        });
        if !ctx.rule.message.is_empty() {
            body["message"] = json!(ctx.rule.message);
        }
        if let Some(url) = &ctx.image_public_url {
            body["imageUrl"] = json!(url);
        }
        if let Some(err) = &ctx.error {
            body["error"] = json!(err.to_string());
        }
        body
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError> {
        tracing::info!(notifier = %self.base.name, rule_id = ctx.rule.id, url = %self.url, "sending webhook");

        let mut req = WebhookRequest::json(&self.url, &Self::payload(ctx))?;
        req.http_method = self.method.clone();
        req.user = self.user.clone();
        req.password = self.password.clone();
        if let Some(secret) = &self.secret {
            let signature = sign_data(secret.as_bytes(), req.body.as_bytes());
            req.headers.insert(SIGNATURE_HEADER.into(), signature);
        }
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
    use sentinel_common::crypto::verify_signature;

    #[test]
    fn rejects_unsupported_method() {
        let cfg = config("webhook", json!({ "url": "http://hook", "httpMethod": "DELETE" }));
        assert!(WebhookNotifier::new(&cfg, RecordingTransport::new()).is_err());
    }

    #[tokio::test]
    async fn body_and_method() {
        let t = RecordingTransport::new();
        let cfg = config("webhook", json!({ "url": "http://hook/in", "httpMethod": "put" }));
        WebhookNotifier::new(&cfg, t.clone())
            .unwrap()
            .notify(&ctx(AlertState::Ok, AlertState::Alerting))
            .await
            .unwrap();

        let req = t.last_webhook();
        assert_eq!(req.http_method, Method::PUT);
        assert!(!req.headers.contains_key(SIGNATURE_HEADER));
        let body = t.last_body();
        assert_eq!(body["state"], "alerting");
        assert_eq!(body["ruleId"], 12);
        assert_eq!(body["evalMatches"][0]["metric"], "cpu{host=web-1}");
        assert_eq!(body["tags"]["team"], "infra");
    }

    #[tokio::test]
    async fn signs_body_with_secret() {
        let t = RecordingTransport::new();
        let cfg = config("webhook", json!({ "url": "http://hook/in", "secret": "topsecret" }));
        WebhookNotifier::new(&cfg, t.clone())
            .unwrap()
            .notify(&ctx(AlertState::Ok, AlertState::Alerting))
            .await
            .unwrap();

        let req = t.last_webhook();
        let sig = &req.headers[SIGNATURE_HEADER];
        assert!(verify_signature(b"topsecret", req.body.as_bytes(), sig));
    }
}
