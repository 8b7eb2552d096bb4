use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::AlertState;

/// Conditional state write: applied only while the stored state is still
/// `expected` and the rule is not paused.
#[derive(Debug, Clone, PartialEq)]
pub struct SetAlertState {
    pub alert_id: i64,
    pub org_id: i64,
    pub expected: AlertState,
    pub state: AlertState,
    pub error: Option<String>,
    pub eval_data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub state_changes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: String,
    pub org_id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub alert_id: i64,
    pub prev_state: AlertState,
    pub new_state: AlertState,
    pub text: String,
    pub epoch_ms: i64,
    pub data: serde_json::Value,
}

/// Stored notification channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub id: i64,
    pub uid: String,
    #[serde(default = "default_org")]
    pub org_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default = "yes")]
    pub upload_image: bool,
    #[serde(default, with = "humantime_serde")]
    pub frequency: Duration,
    #[serde(default)]
    pub settings: serde_json::Value,
}

fn default_org() -> i64 {
    1
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStateKind {
    #[default]
    Unknown,
    Pending,
    Completed,
}

/// Per (rule, channel) delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState {
    pub id: i64,
    pub org_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
    pub state: NotificationStateKind,
    pub version: i64,
    pub updated_at: i64,
    pub alert_rule_state_updated_version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetNotificationPending {
    pub id: i64,
    pub version: i64,
    pub alert_rule_state_updated_version: i64,
}
