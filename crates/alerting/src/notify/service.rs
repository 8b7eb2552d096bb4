use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use super::image::{ImageRenderer, ImageUploader, RenderOpts};
use super::transport::Transport;
use crate::alert::{AlertState, EvalContext, Rule};
use crate::condition::EvalMatch;
use crate::error::{NotifyError, StoreError};
use crate::metrics::AlertingMetrics;
use crate::notifier::{Notifier, NotifierRegistry};
use crate::store::{AlertStore, NotificationConfig, NotificationState, SetNotificationPending};

/// Entry point the result handler uses to deliver a finished evaluation.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_if_needed(&self, ctx: &mut EvalContext) -> Result<(), NotifyError>;
}

struct Selected {
    notifier: Box<dyn Notifier>,
    state: NotificationState,
}

pub struct NotificationService {
    store: Arc<dyn AlertStore>,
    registry: Arc<NotifierRegistry>,
    transport: Arc<dyn Transport>,
    renderer: Option<Arc<dyn ImageRenderer>>,
    uploader: Option<Arc<dyn ImageUploader>>,
    metrics: Arc<AlertingMetrics>,
    notification_timeout: Duration,
    app_url: String,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn AlertStore>,
        registry: Arc<NotifierRegistry>,
        transport: Arc<dyn Transport>,
        metrics: Arc<AlertingMetrics>,
        notification_timeout: Duration,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            renderer: None,
            uploader: None,
            metrics,
            notification_timeout,
            app_url: app_url.into(),
        }
    }

    pub fn with_images(
        mut self,
        renderer: Arc<dyn ImageRenderer>,
        uploader: Option<Arc<dyn ImageUploader>>,
    ) -> Self {
        self.renderer = Some(renderer);
        self.uploader = uploader;
        self
    }

    /// Delivers a synthetic alerting event to a single channel configuration.
    pub async fn send_test(&self, config: &NotificationConfig) -> Result<(), NotifyError> {
        let notifier = self.registry.build(config, self.transport.clone())?;

        let rule = Rule {
            id: -1,
            org_id: config.org_id,
            name: "Test notification".into(),
            message: "Someone is testing the alert notification within Sentinel.".into(),
            state: AlertState::Alerting,
            ..Default::default()
        };
        let mut ctx = EvalContext::new(rule, CancellationToken::new(), self.app_url.clone());
        ctx.is_test_run = true;
        ctx.firing = true;
        ctx.prev_alert_state = AlertState::Ok;
        ctx.eval_matches = vec![
            EvalMatch {
                metric: "High value".into(),
                value: Some(100.0),
                tags: BTreeMap::new(),
            },
            EvalMatch {
                metric: "Higher Value".into(),
                value: Some(200.0),
                tags: BTreeMap::new(),
            },
        ];

        notifier.notify(&ctx).await
    }

    async fn select(&self, ctx: &EvalContext) -> Result<Vec<Selected>, NotifyError> {
        let configs = self
            .store
            .notifications_to_send(ctx.rule.org_id, &ctx.rule.notifications)
            .await?;

        let now = Utc::now();
        let mut selected = Vec::with_capacity(configs.len());
        for config in &configs {
            let notifier = match self.registry.build(config, self.transport.clone()) {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(notifier = %config.uid, error = %e, "could not create notifier");
                    continue;
                }
            };
            if !notifier.passes_filter(&ctx.rule) {
                continue;
            }

            let state = match self
                .store
                .get_or_create_notification_state(ctx.rule.org_id, ctx.rule.id, notifier.id())
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(notifier = %config.uid, error = %e, "could not get notification state");
                    continue;
                }
            };

            if notifier.should_notify(ctx, &state, now) {
                selected.push(Selected { notifier, state });
            }
        }
        Ok(selected)
    }

    async fn render_and_upload(&self, ctx: &mut EvalContext) {
        let (Some(renderer), Some(path)) = (&self.renderer, ctx.panel_render_path()) else {
            return;
        };

        let opts = RenderOpts::panel(path, ctx.rule.org_id, self.notification_timeout / 2);
        let file = match renderer.render(opts).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(rule_id = ctx.rule.id, error = %e, "failed to render panel image");
                return;
            }
        };

        if let Some(uploader) = &self.uploader {
            match uploader.upload(&file).await {
                Ok(url) => ctx.image_public_url = Some(url),
                Err(e) => tracing::warn!(rule_id = ctx.rule.id, error = %e, "failed to upload panel image"),
            }
        }
        ctx.image_on_disk_path = Some(file);
    }

    async fn send_one(&self, ctx: &EvalContext, target: &Selected) -> Result<(), NotifyError> {
        let notifier = &target.notifier;

        let version = if ctx.is_test_run {
            None
        } else {
            let claim = SetNotificationPending {
                id: target.state.id,
                version: target.state.version,
                alert_rule_state_updated_version: ctx.rule.state_changes,
            };
            match self.store.set_notification_state_pending(claim).await {
                Ok(v) => Some(v),
                Err(StoreError::VersionConflict) => {
                    tracing::debug!(notifier = %notifier.uid(), rule_id = ctx.rule.id, "notification already being sent");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::debug!(notifier = %notifier.uid(), kind = notifier.notifier_type(), "sending notification");
        if let Err(e) = notifier.notify(ctx).await {
            self.metrics.inc_notifications_failed();
            tracing::error!(notifier = %notifier.uid(), kind = notifier.notifier_type(), error = %e, "failed to send notification");
            return Err(e);
        }
        self.metrics.inc_notifications_sent();

        match version {
            Some(v) => Ok(self.store.set_notification_state_complete(target.state.id, v).await?),
            None => Ok(()),
        }
    }

    /// Every send is started before any result is inspected, so one failing
    /// destination never prevents delivery to the others.
    async fn fan_out(&self, ctx: &EvalContext, targets: &[Selected]) -> Result<(), NotifyError> {
        let sends = join_all(targets.iter().map(|t| self.send_one(ctx, t)));
        let results = tokio::select! {
            biased;
            _ = ctx.scope.cancelled() => return Err(NotifyError::Cancelled),
            results = sends => results,
        };
        results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
    }

    async fn deliver(&self, ctx: &mut EvalContext) -> Result<(), NotifyError> {
        let targets = self.select(ctx).await?;
        if targets.is_empty() {
            return Ok(());
        }

        if targets.iter().any(|t| t.notifier.needs_image()) {
            self.render_and_upload(ctx).await;
        }
        ctx.render_template_fields();

        self.fan_out(ctx, &targets).await
    }
}

#[async_trait::async_trait]
impl NotificationSender for NotificationService {
    async fn send_if_needed(&self, ctx: &mut EvalContext) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.notification_timeout, self.deliver(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.notification_timeout)),
        }
    }
}
