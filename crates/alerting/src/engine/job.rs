use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::alert::{AlertState, EvalContext, Rule};

/// A scheduled rule plus the flag that keeps it from being dispatched twice.
pub struct Job {
    rule: RwLock<Rule>,
    running: AtomicBool,
}

impl Job {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule: RwLock::new(rule),
            running: AtomicBool::new(false),
        }
    }

    pub fn rule(&self) -> Rule {
        match self.rule.read() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn rule_id(&self) -> i64 {
        self.with_rule(|r| r.id)
    }

    pub fn state(&self) -> AlertState {
        self.with_rule(|r| r.state)
    }

    pub fn replace_rule(&self, rule: Rule) {
        self.with_rule_mut(|r| *r = rule);
    }

    /// Carries the state the result handler settled on over to the next run.
    pub fn apply_result(&self, ctx: &EvalContext) {
        self.with_rule_mut(|r| {
            r.state = ctx.rule.state;
            r.state_changes = ctx.rule.state_changes;
            r.last_state_change = ctx.rule.last_state_change;
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    fn with_rule<T>(&self, f: impl FnOnce(&Rule) -> T) -> T {
        match self.rule.read() {
            Ok(r) => f(&r),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn with_rule_mut(&self, f: impl FnOnce(&mut Rule)) {
        match self.rule.write() {
            Ok(mut r) => f(&mut r),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
