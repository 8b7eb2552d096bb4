use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::job::Job;
use super::result::ResultHandler;
use crate::alert::{EvalContext, EvalHandler};
use crate::config::AlertingSettings;
use crate::error::{EngineError, EvalError};
use crate::metrics::AlertingMetrics;

/// How long an in-flight job may keep running once shutdown is requested.
pub const UNFINISHED_WORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one job to completion: evaluation with bounded retries, then the
/// result handler.
pub struct JobDispatcher {
    eval_handler: Arc<dyn EvalHandler>,
    result_handler: Arc<dyn ResultHandler>,
    metrics: Arc<AlertingMetrics>,
    max_attempts: u32,
    evaluation_timeout: Duration,
    app_url: String,
}

impl JobDispatcher {
    pub fn new(
        eval_handler: Arc<dyn EvalHandler>,
        result_handler: Arc<dyn ResultHandler>,
        metrics: Arc<AlertingMetrics>,
        settings: &AlertingSettings,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            eval_handler,
            result_handler,
            metrics,
            max_attempts: settings.max_attempts.max(1),
            evaluation_timeout: settings.evaluation_timeout,
            app_url: app_url.into(),
        }
    }

    /// Processes `job`, giving in-flight work `UNFINISHED_WORK_TIMEOUT` to
    /// finish once `shutdown` fires. Every scope opened along the way is
    /// cancelled and the job's running flag cleared before returning.
    pub async fn process_job_with_retry(
        &self,
        shutdown: &CancellationToken,
        job: Arc<Job>,
    ) -> Result<(), EngineError> {
        let (cancel_tx, mut cancel_rx) = mpsc::channel(self.max_attempts as usize * 2);
        job.set_running(true);

        let result = {
            let work = self.run_attempts(&job, &cancel_tx);
            tokio::pin!(work);

            tokio::select! {
                biased;
                _ = &mut work => Ok(()),
                _ = shutdown.cancelled() => {
                    match tokio::time::timeout(UNFINISHED_WORK_TIMEOUT, &mut work).await {
                        Ok(()) => Ok(()),
                        Err(_) => {
                            tracing::warn!(rule_id = job.rule_id(), "job abandoned at shutdown");
                            Err(EngineError::ShutdownTimeout { rule_id: job.rule_id() })
                        }
                    }
                }
            }
        };

        end_job(&job, &mut cancel_rx);
        result
    }

    async fn run_attempts(&self, job: &Job, cancel_tx: &mpsc::Sender<CancellationToken>) {
        for attempt in 1..=self.max_attempts {
            self.metrics.inc_eval_attempts();
            let scope = CancellationToken::new();
            register(cancel_tx, &scope);

            let mut ctx = EvalContext::new(job.rule(), scope.clone(), self.app_url.as_str());
            let timed_out = tokio::time::timeout(self.evaluation_timeout, self.eval_handler.eval(&mut ctx))
                .await
                .is_err();
            if timed_out {
                scope.cancel();
                ctx.error = Some(EvalError::Timeout(self.evaluation_timeout));
                ctx.end_time = Some(chrono::Utc::now());
            }

            if let Some(e) = &ctx.error {
                if attempt < self.max_attempts {
                    tracing::debug!(rule_id = ctx.rule.id, attempt, error = %e, "evaluation failed, retrying");
                    self.metrics.inc_eval_retries();
                    scope.cancel();
                    continue;
                }
                tracing::warn!(rule_id = ctx.rule.id, attempts = attempt, error = %e, "evaluation failed");
                self.metrics.inc_eval_exhausted();
            }

            let notify_scope = CancellationToken::new();
            register(cancel_tx, &notify_scope);
            ctx.scope = notify_scope;
            ctx.rule.state = ctx.new_state();

            if let Err(e) = self.result_handler.handle(&mut ctx).await {
                tracing::error!(rule_id = ctx.rule.id, error = %e, "failed to handle result");
            }
            job.apply_result(&ctx);
            return;
        }
    }
}

fn register(cancel_tx: &mpsc::Sender<CancellationToken>, scope: &CancellationToken) {
    // sized for every attempt plus the notification scope
    if cancel_tx.try_send(scope.clone()).is_err() {
        tracing::debug!("cancel channel full");
    }
}

fn end_job(job: &Job, cancel_rx: &mut mpsc::Receiver<CancellationToken>) {
    job.set_running(false);
    cancel_rx.close();
    while let Ok(scope) = cancel_rx.try_recv() {
        scope.cancel();
    }
}
