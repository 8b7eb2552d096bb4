use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub struct AlertingMetrics {
    jobs_scheduled: AtomicU64,
    jobs_skipped: AtomicU64,
    eval_attempts: AtomicU64,
    eval_retries: AtomicU64,
    eval_exhausted: AtomicU64,
    state_transitions: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    execution_latency_sum_us: AtomicU64,
    execution_latency_count: AtomicU64,
}

impl AlertingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_jobs_scheduled(&self) {
        self.jobs_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_jobs_skipped(&self) {
        self.jobs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eval_attempts(&self) {
        self.eval_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eval_retries(&self) {
        self.eval_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eval_exhausted(&self) {
        self.eval_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_state_transitions(&self) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution_latency(&self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let us = (end - start).num_microseconds().unwrap_or(0).max(0) as u64;
        self.execution_latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.execution_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_scheduled_val(&self) -> u64 {
        self.jobs_scheduled.load(Ordering::Relaxed)
    }

    pub fn jobs_skipped_val(&self) -> u64 {
        self.jobs_skipped.load(Ordering::Relaxed)
    }

    pub fn eval_attempts_val(&self) -> u64 {
        self.eval_attempts.load(Ordering::Relaxed)
    }

    pub fn eval_retries_val(&self) -> u64 {
        self.eval_retries.load(Ordering::Relaxed)
    }

    pub fn eval_exhausted_val(&self) -> u64 {
        self.eval_exhausted.load(Ordering::Relaxed)
    }

    pub fn state_transitions_val(&self) -> u64 {
        self.state_transitions.load(Ordering::Relaxed)
    }

    pub fn notifications_sent_val(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed_val(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    pub fn execution_latency_vals(&self) -> (u64, u64) {
        (
            self.execution_latency_sum_us.load(Ordering::Relaxed),
            self.execution_latency_count.load(Ordering::Relaxed),
        )
    }
}
