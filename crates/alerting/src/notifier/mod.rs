//! Notification destinations.
//!
//! Every destination type implements [`Notifier`] on top of a shared
//! [`NotifierBase`] carrying identity and the send policy. Variants are
//! created from stored [`NotificationConfig`]s through the
//! [`NotifierRegistry`] and deliver through a [`Transport`].

mod discord;
mod email;
mod googlechat;
mod opsgenie;
mod pagerduty;
pub mod registry;
mod sensu;
mod settings;
mod slack;
mod teams;
mod threema;
mod webhook;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alert::{AlertState, EvalContext, Rule};
use crate::error::{NotifyError, ValidationError};
use crate::notify::Transport;
use crate::store::{NotificationConfig, NotificationState, NotificationStateKind};

pub use email::EmailNotifier;
pub use registry::{NotifierDescriptor, NotifierFactory, NotifierRegistry};
pub use settings::Settings;

/// Pending sends younger than this are assumed to still be in flight.
const PENDING_SEND_WINDOW: Duration = Duration::from_secs(60);

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, ctx: &EvalContext) -> Result<(), NotifyError>;

    fn base(&self) -> &NotifierBase;

    fn notifier_type(&self) -> &str {
        &self.base().notifier_type
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn id(&self) -> i64 {
        self.base().id
    }

    fn uid(&self) -> &str {
        &self.base().uid
    }

    fn is_default(&self) -> bool {
        self.base().is_default
    }

    fn needs_image(&self) -> bool {
        self.base().upload_image
    }

    fn passes_filter(&self, rule: &Rule) -> bool {
        self.base().passes_filter(rule)
    }

    fn should_notify(&self, ctx: &EvalContext, state: &NotificationState, now: DateTime<Utc>) -> bool {
        self.base().should_notify(ctx, state, now)
    }
}

/// Identity and send policy shared by every notifier.
pub struct NotifierBase {
    pub id: i64,
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    pub notifier_type: String,
    pub is_default: bool,
    pub upload_image: bool,
    pub send_reminder: bool,
    pub disable_resolve_message: bool,
    pub frequency: Duration,
    pub mute_until: Option<DateTime<Utc>>,
    pub match_tags: BTreeMap<String, String>,
    pub transport: Arc<dyn Transport>,
}

impl NotifierBase {
    pub fn new(config: &NotificationConfig, transport: Arc<dyn Transport>) -> Result<Self, ValidationError> {
        if config.send_reminder && config.frequency.is_zero() {
            return Err(ValidationError::invalid(
                "frequency",
                "a reminder frequency is required when send_reminder is set",
            ));
        }

        let settings = Settings::new(&config.settings);
        let mute_until = settings
            .str("mute_until")
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| ValidationError::invalid("mute_until", e.to_string()))
            })
            .transpose()?;

        let match_tags = config
            .settings
            .get("match_tags")
            .and_then(|v| v.as_object())
            .map(|tags| {
                tags.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: config.id,
            uid: config.uid.clone(),
            org_id: config.org_id,
            name: config.name.clone(),
            notifier_type: config.notifier_type.clone(),
            is_default: config.is_default,
            upload_image: config.upload_image,
            send_reminder: config.send_reminder,
            disable_resolve_message: config.disable_resolve_message,
            frequency: config.frequency,
            mute_until,
            match_tags,
            transport,
        })
    }

    pub fn passes_filter(&self, rule: &Rule) -> bool {
        rule.org_id == self.org_id
            && self
                .match_tags
                .iter()
                .all(|(k, v)| rule.tags.get(k) == Some(v))
    }

    pub fn should_notify(&self, ctx: &EvalContext, state: &NotificationState, now: DateTime<Utc>) -> bool {
        let prev = ctx.prev_alert_state;
        let next = ctx.rule.state;

        if self.mute_until.is_some_and(|until| now < until) {
            return false;
        }

        if prev == next {
            if !self.send_reminder {
                return false;
            }
            if state.updated_at != 0 && since(state.updated_at, now) < self.frequency {
                return false;
            }
            if matches!(next, AlertState::Ok | AlertState::Pending) {
                return false;
            }
        }

        let ok_or_pending = matches!(next, AlertState::Ok | AlertState::Pending);
        if prev == AlertState::Unknown && ok_or_pending {
            return false;
        }
        if prev == AlertState::Ok && next == AlertState::Pending {
            return false;
        }
        if prev == AlertState::Pending && next == AlertState::Ok {
            return false;
        }

        if state.state == NotificationStateKind::Pending
            && since(state.updated_at, now) < PENDING_SEND_WINDOW
        {
            return false;
        }

        !(next == AlertState::Ok && self.disable_resolve_message)
    }
}

fn since(unix_secs: i64, now: DateTime<Utc>) -> Duration {
    let then = DateTime::from_timestamp(unix_secs, 0).unwrap_or_default();
    (now - then).to_std().unwrap_or_default()
}

/// Matched series as `(metric, value)` pairs, `null` for missing values.
pub(crate) fn match_lines(ctx: &EvalContext) -> Vec<(String, String)> {
    ctx.eval_matches
        .iter()
        .map(|m| {
            let value = m
                .value
                .map(|v| format!("{v}"))
                .unwrap_or_else(|| "null".to_string());
            (m.metric.clone(), value)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::condition::EvalMatch;
    use crate::notify::{EmailMessage, WebhookRequest};

    #[derive(Default)]
    pub struct RecordingTransport {
        pub webhooks: Mutex<Vec<WebhookRequest>>,
        pub emails: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn last_webhook(&self) -> WebhookRequest {
            self.webhooks.lock().unwrap().last().cloned().unwrap()
        }

        pub fn last_body(&self) -> serde_json::Value {
            serde_json::from_str(&self.last_webhook().body).unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send_webhook(&self, req: WebhookRequest) -> Result<(), NotifyError> {
            self.webhooks.lock().unwrap().push(req);
            Ok(())
        }

        async fn send_email(&self, msg: EmailMessage) -> Result<(), NotifyError> {
            self.emails.lock().unwrap().push(msg);
            Ok(())
        }
    }

    pub fn config(notifier_type: &str, settings: serde_json::Value) -> NotificationConfig {
        NotificationConfig {
            id: 1,
            uid: format!("{notifier_type}-1"),
            org_id: 1,
            name: format!("{notifier_type} channel"),
            notifier_type: notifier_type.into(),
            is_default: false,
            send_reminder: false,
            disable_resolve_message: false,
            upload_image: false,
            frequency: Duration::ZERO,
            settings,
        }
    }

    pub fn ctx(prev: AlertState, state: AlertState) -> EvalContext {
        let rule = Rule {
            id: 12,
            org_id: 1,
            name: "High CPU".into(),
            message: "CPU above 90%".into(),
            state: prev,
            tags: BTreeMap::from([("team".to_string(), "infra".to_string())]),
            ..Default::default()
        };
        let mut ctx = EvalContext::new(rule, CancellationToken::new(), "http://sentinel.local/");
        ctx.rule.state = state;
        ctx.firing = state == AlertState::Alerting;
        ctx.eval_matches = vec![EvalMatch {
            metric: "cpu{host=web-1}".into(),
            value: Some(97.5),
            tags: BTreeMap::from([("host".to_string(), "web-1".to_string())]),
        }];
        ctx
    }
}
