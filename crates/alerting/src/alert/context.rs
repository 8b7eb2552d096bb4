use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::rule::Rule;
use super::state::{AlertState, Outcome};
use crate::condition::EvalMatch;
use crate::error::EvalError;

/// Working record of one evaluation attempt.
///
/// Created fresh for every attempt, filled in by the evaluation handler and
/// handed to the result handler once the attempt is final.
pub struct EvalContext {
    pub rule: Rule,
    pub scope: CancellationToken,
    pub firing: bool,
    pub no_data_found: bool,
    pub is_test_run: bool,
    pub eval_matches: Vec<EvalMatch>,
    pub all_matches: Vec<EvalMatch>,
    pub condition_evals: String,
    pub error: Option<EvalError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub prev_alert_state: AlertState,
    pub image_on_disk_path: Option<PathBuf>,
    pub image_public_url: Option<String>,
    pub app_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateModel {
    pub text: &'static str,
    pub color: &'static str,
}

impl EvalContext {
    pub fn new(rule: Rule, scope: CancellationToken, app_url: impl Into<String>) -> Self {
        let mut app_url = app_url.into();
        if !app_url.ends_with('/') {
            app_url.push('/');
        }
        Self {
            prev_alert_state: rule.state,
            rule,
            scope,
            firing: false,
            no_data_found: false,
            is_test_run: false,
            eval_matches: Vec::new(),
            all_matches: Vec::new(),
            condition_evals: String::new(),
            error: None,
            start_time: Utc::now(),
            end_time: None,
            image_on_disk_path: None,
            image_public_url: None,
            app_url,
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.error.is_some() {
            Outcome::Error
        } else if self.firing {
            Outcome::Firing
        } else if self.no_data_found {
            Outcome::NoData
        } else {
            Outcome::Ok
        }
    }

    pub fn new_state(&self) -> AlertState {
        self.new_state_at(Utc::now())
    }

    pub fn new_state_at(&self, now: DateTime<Utc>) -> AlertState {
        let held_for = (now - self.rule.last_state_change).to_std().unwrap_or_default();
        self.prev_alert_state
            .transition(self.outcome(), &self.rule.state_policy(), held_for)
    }

    pub fn should_update_alert_state(&self) -> bool {
        self.rule.state != self.prev_alert_state
    }

    pub fn state_model(&self) -> StateModel {
        match self.rule.state {
            AlertState::Ok => StateModel { text: "OK", color: "#36a64f" },
            AlertState::Pending => StateModel { text: "Pending", color: "#888888" },
            AlertState::Alerting => StateModel { text: "Alerting", color: "#D63232" },
            AlertState::NoData => StateModel { text: "No Data", color: "#888888" },
            AlertState::Paused => StateModel { text: "Paused", color: "#888888" },
            AlertState::Unknown => StateModel { text: "Unknown", color: "#888888" },
        }
    }

    pub fn notification_title(&self) -> String {
        format!("[{}] {}", self.state_model().text, self.rule.name)
    }

    /// Deep link back to the rule, through its dashboard panel when it has one.
    pub fn rule_url(&self) -> String {
        if self.rule.dashboard_uid.is_empty() {
            return format!("{}alerting/rules/{}?orgId={}", self.app_url, self.rule.id, self.rule.org_id);
        }
        format!(
            "{}d/{}?tab=alert&viewPanel={}&orgId={}",
            self.app_url, self.rule.dashboard_uid, self.rule.panel_id, self.rule.org_id
        )
    }

    /// Path of the single-panel view the image renderer screenshots.
    pub fn panel_render_path(&self) -> Option<String> {
        if self.rule.dashboard_uid.is_empty() {
            return None;
        }
        Some(format!(
            "d-solo/{}?orgId={}&panelId={}",
            self.rule.dashboard_uid, self.rule.org_id, self.rule.panel_id
        ))
    }

    /// Replaces `${tag}` placeholders in the rule name and message with the
    /// tag values of the matched series.
    pub fn render_template_fields(&mut self) {
        let matches = if self.eval_matches.is_empty() {
            &self.all_matches
        } else {
            &self.eval_matches
        };
        if matches.is_empty() {
            return;
        }

        let mut values: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for m in matches {
            for (k, v) in &m.tags {
                values.entry(k.as_str()).or_default().insert(v.as_str());
            }
        }

        let mut name = self.rule.name.clone();
        let mut message = self.rule.message.clone();
        for (key, vals) in &values {
            let placeholder = format!("${{{key}}}");
            let joined = vals.iter().copied().collect::<Vec<_>>().join(", ");
            name = name.replace(&placeholder, &joined);
            message = message.replace(&placeholder, &joined);
        }
        self.rule.name = name;
        self.rule.message = message;
    }
}
