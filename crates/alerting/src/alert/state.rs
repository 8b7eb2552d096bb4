use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    Alerting,
    Ok,
    NoData,
    Paused,
    #[default]
    Unknown,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Alerting => "alerting",
            Self::Ok => "ok",
            Self::NoData => "no_data",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    /// Next state for a finished evaluation.
    ///
    /// `self` is the state before the evaluation and `held_for` is how long
    /// the rule has been in that state. A rule with a non-zero `for` window
    /// passes through `Pending` and only reaches `Alerting` once it has been
    /// pending for the whole window.
    pub fn transition(self, outcome: Outcome, policy: &StatePolicy, held_for: Duration) -> Self {
        let target = match outcome {
            Outcome::Error => policy.execution_error.to_alert_state().unwrap_or(self),
            Outcome::Firing => Self::Alerting,
            Outcome::NoData => policy.no_data.to_alert_state().unwrap_or(self),
            Outcome::Ok => Self::Ok,
        };

        if target != Self::Alerting || policy.for_duration.is_zero() {
            return target;
        }

        match self {
            Self::Pending if held_for >= policy.for_duration => Self::Alerting,
            Self::Alerting => Self::Alerting,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of one evaluation pass, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Error,
    Firing,
    NoData,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataOption {
    Alerting,
    #[default]
    NoData,
    KeepState,
    Ok,
}

impl NoDataOption {
    pub fn to_alert_state(self) -> Option<AlertState> {
        match self {
            Self::Alerting => Some(AlertState::Alerting),
            Self::NoData => Some(AlertState::NoData),
            Self::KeepState => None,
            Self::Ok => Some(AlertState::Ok),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorOption {
    Alerting,
    KeepState,
    #[default]
    Unknown,
}

impl ExecutionErrorOption {
    pub fn to_alert_state(self) -> Option<AlertState> {
        match self {
            Self::Alerting => Some(AlertState::Alerting),
            Self::KeepState => None,
            Self::Unknown => Some(AlertState::Unknown),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatePolicy {
    pub no_data: NoDataOption,
    pub execution_error: ExecutionErrorOption,
    pub for_duration: Duration,
}
