use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::job::Job;
use crate::alert::{AlertState, Rule};
use crate::metrics::AlertingMetrics;

struct Entry {
    job: Arc<Job>,
    next_due: DateTime<Utc>,
}

/// Decides which rules are due on each tick.
///
/// First runs are staggered across the rule's frequency by its position in
/// the rule list so a reload does not evaluate everything on the same tick.
pub struct Scheduler {
    entries: HashMap<i64, Entry>,
    metrics: Arc<AlertingMetrics>,
}

impl Scheduler {
    pub fn new(metrics: Arc<AlertingMetrics>) -> Self {
        Self {
            entries: HashMap::new(),
            metrics,
        }
    }

    /// Replaces the scheduled set. Jobs for rules that survive keep their
    /// running flag and due time; removed rules are dropped.
    pub fn update(&mut self, mut rules: Vec<Rule>, now: DateTime<Utc>) {
        rules.sort_by_key(|r| r.id);
        let count = rules.len().max(1) as u32;
        let mut entries = HashMap::with_capacity(rules.len());

        for (i, rule) in rules.into_iter().enumerate() {
            let id = rule.id;
            let entry = match self.entries.remove(&id) {
                Some(existing) => {
                    let same_frequency = existing.job.rule().frequency == rule.frequency;
                    existing.job.replace_rule(rule);
                    if same_frequency {
                        existing
                    } else {
                        Entry {
                            next_due: now,
                            job: existing.job,
                        }
                    }
                }
                None => {
                    let offset = rule.frequency * i as u32 / count;
                    Entry {
                        next_due: now
                            + chrono::Duration::from_std(offset)
                                .unwrap_or_else(|_| chrono::Duration::zero()),
                        job: Arc::new(Job::new(rule)),
                    }
                }
            };
            entries.insert(id, entry);
        }

        tracing::debug!(rules = entries.len(), "scheduler updated");
        self.entries = entries;
    }

    /// Enqueues every due job that is not already running. Never blocks:
    /// a full queue skips the job until its next due time.
    pub fn tick(&mut self, now: DateTime<Utc>, queue: &mpsc::Sender<Arc<Job>>) {
        for entry in self.entries.values_mut() {
            if now < entry.next_due {
                continue;
            }
            let frequency = entry.job.rule().frequency;
            entry.next_due = next_due_after(entry.next_due, frequency, now);

            if entry.job.is_running() || entry.job.state() == AlertState::Paused {
                self.metrics.inc_jobs_skipped();
                continue;
            }

            entry.job.set_running(true);
            match queue.try_send(entry.job.clone()) {
                Ok(()) => self.metrics.inc_jobs_scheduled(),
                Err(TrySendError::Full(job)) => {
                    job.set_running(false);
                    self.metrics.inc_jobs_skipped();
                    tracing::warn!(rule_id = job.rule_id(), "exec queue full, skipping");
                }
                Err(TrySendError::Closed(job)) => {
                    job.set_running(false);
                    tracing::debug!(rule_id = job.rule_id(), "exec queue closed");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn next_due_after(
    mut due: DateTime<Utc>,
    frequency: std::time::Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let step = match chrono::Duration::from_std(frequency) {
        Ok(step) if step > chrono::Duration::zero() => step,
        _ => return now + chrono::Duration::seconds(1),
    };
    while due <= now {
        due += step;
    }
    due
}
