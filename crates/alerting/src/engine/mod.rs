//! Scheduling and execution of alert rules.
//!
//! A ticker enqueues due jobs onto a bounded queue; a runner pulls them off
//! and drives each through [`JobDispatcher`] on its own task. Both stop when
//! the shutdown token fires, and the runner waits for in-flight jobs.

mod dispatcher;
mod job;
mod reader;
mod result;
mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::AlertingSettings;

pub use dispatcher::{JobDispatcher, UNFINISHED_WORK_TIMEOUT};
pub use job::Job;
pub use reader::RuleReader;
pub use result::{ResultHandler, StateResultHandler};
pub use scheduler::Scheduler;

pub struct AlertEngine {
    scheduler: Scheduler,
    reader: RuleReader,
    dispatcher: Arc<JobDispatcher>,
    settings: AlertingSettings,
    ready: Arc<AtomicBool>,
}

impl AlertEngine {
    pub fn new(
        scheduler: Scheduler,
        reader: RuleReader,
        dispatcher: Arc<JobDispatcher>,
        settings: AlertingSettings,
    ) -> Self {
        Self {
            scheduler,
            reader,
            dispatcher,
            settings,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set once the first rule load has been scheduled.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Runs until `shutdown` fires and every in-flight job has ended.
    pub async fn run(self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel(self.settings.exec_queue_capacity);
        tracing::info!(
            tick_interval = ?self.settings.tick_interval,
            max_attempts = self.settings.max_attempts,
            "alert engine started"
        );

        let ticker = ticker_loop(
            self.scheduler,
            self.reader,
            self.settings.clone(),
            self.ready,
            tx,
            shutdown.clone(),
        );
        let runner = run_job_loop(self.dispatcher, rx, shutdown);
        tokio::join!(ticker, runner);

        tracing::info!("alert engine stopped");
    }
}

async fn ticker_loop(
    mut scheduler: Scheduler,
    reader: RuleReader,
    settings: AlertingSettings,
    ready: Arc<AtomicBool>,
    tx: mpsc::Sender<Arc<Job>>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(settings.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let reload_every = u64::from(settings.rule_reload_ticks.max(1));
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if ticks % reload_every == 0 {
            if let Some(rules) = reader.fetch().await {
                scheduler.update(rules, Utc::now());
                ready.store(true, Ordering::Release);
            }
        }
        ticks += 1;

        scheduler.tick(Utc::now(), &tx);
    }
    tracing::debug!("ticker stopped");
}

async fn run_job_loop(
    dispatcher: Arc<JobDispatcher>,
    mut rx: mpsc::Receiver<Arc<Job>>,
    shutdown: CancellationToken,
) {
    let mut jobs = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(done) = jobs.join_next(), if !jobs.is_empty() => log_job_end(done),
            job = rx.recv() => match job {
                Some(job) => {
                    let dispatcher = dispatcher.clone();
                    let shutdown = shutdown.clone();
                    jobs.spawn(async move { dispatcher.process_job_with_retry(&shutdown, job).await });
                }
                None => break,
            },
        }
    }

    // queued but never started
    rx.close();
    while let Ok(job) = rx.try_recv() {
        job.set_running(false);
    }

    while let Some(done) = jobs.join_next().await {
        log_job_end(done);
    }
}

fn log_job_end(done: Result<Result<(), crate::error::EngineError>, tokio::task::JoinError>) {
    match done {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "job ended with error"),
        Err(e) => tracing::error!(error = %e, "job task panicked"),
    }
}
