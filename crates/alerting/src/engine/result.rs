use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::alert::{AlertState, EvalContext};
use crate::error::StoreError;
use crate::metrics::AlertingMetrics;
use crate::notify::NotificationSender;
use crate::store::{AlertStore, Annotation, SetAlertState};

/// Applies a finished evaluation: persists the state change, annotates it and
/// hands the context to the notification layer.
#[async_trait::async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle(&self, ctx: &mut EvalContext) -> Result<(), StoreError>;
}

pub struct StateResultHandler {
    store: Arc<dyn AlertStore>,
    notifications: Arc<dyn NotificationSender>,
    metrics: Arc<AlertingMetrics>,
}

impl StateResultHandler {
    pub fn new(
        store: Arc<dyn AlertStore>,
        notifications: Arc<dyn NotificationSender>,
        metrics: Arc<AlertingMetrics>,
    ) -> Self {
        Self {
            store,
            notifications,
            metrics,
        }
    }

    fn eval_data(ctx: &EvalContext) -> serde_json::Value {
        let mut data = json!({});
        if !ctx.eval_matches.is_empty() {
            data["evalMatches"] = json!(ctx.eval_matches);
        }
        if let Some(e) = &ctx.error {
            data["error"] = json!(e.to_string());
        } else if ctx.no_data_found {
            data["noData"] = json!(true);
        }
        data
    }

    async fn annotate(&self, ctx: &EvalContext, data: serde_json::Value) {
        let item = Annotation {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: ctx.rule.org_id,
            dashboard_id: ctx.rule.dashboard_id,
            panel_id: ctx.rule.panel_id,
            alert_id: ctx.rule.id,
            prev_state: ctx.prev_alert_state,
            new_state: ctx.rule.state,
            text: ctx.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            epoch_ms: Utc::now().timestamp_millis(),
            data,
        };
        if let Err(e) = self.store.save_annotation(item).await {
            tracing::error!(rule_id = ctx.rule.id, error = %e, "failed to save annotation");
        }
    }
}

#[async_trait::async_trait]
impl ResultHandler for StateResultHandler {
    async fn handle(&self, ctx: &mut EvalContext) -> Result<(), StoreError> {
        if ctx.is_test_run {
            return Ok(());
        }

        if ctx.should_update_alert_state() {
            tracing::info!(
                rule_id = ctx.rule.id,
                prev_state = %ctx.prev_alert_state,
                new_state = %ctx.rule.state,
                "alert state changed"
            );
            let data = Self::eval_data(ctx);
            let cmd = SetAlertState {
                alert_id: ctx.rule.id,
                org_id: ctx.rule.org_id,
                expected: ctx.prev_alert_state,
                state: ctx.rule.state,
                error: ctx.error.as_ref().map(|e| e.to_string()),
                eval_data: data.clone(),
            };

            match self.store.set_alert_state(cmd).await {
                Ok(change) => {
                    ctx.rule.state_changes = change.state_changes;
                    ctx.rule.last_state_change = Utc::now();
                    self.metrics.inc_state_transitions();
                }
                Err(StoreError::AlertPaused) => {
                    tracing::error!(rule_id = ctx.rule.id, "cannot change state on paused alert");
                    ctx.rule.state = AlertState::Paused;
                    return Err(StoreError::AlertPaused);
                }
                Err(StoreError::AlreadyInState(state)) => {
                    tracing::info!(rule_id = ctx.rule.id, %state, "alert already updated");
                    return Ok(());
                }
                Err(StoreError::StaleState {
                    expected,
                    found,
                    since,
                }) => {
                    tracing::info!(
                        rule_id = ctx.rule.id,
                        %expected,
                        %found,
                        "alert state moved by another writer"
                    );
                    ctx.rule.state = found;
                    ctx.rule.last_state_change = since;
                    return Ok(());
                }
                Err(e) => {
                    // nothing was committed, keep the job on the stored state
                    ctx.rule.state = ctx.prev_alert_state;
                    return Err(e);
                }
            }

            self.annotate(ctx, data).await;
        }

        if let Err(e) = self.notifications.send_if_needed(ctx).await {
            tracing::error!(rule_id = ctx.rule.id, error = %e, "failed to send notifications");
        }
        Ok(())
    }
}
