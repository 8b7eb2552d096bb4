use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::alert::AlertState;

/// Failure while evaluating a rule's conditions. Retried by the dispatcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("datasource '{0}' not found")]
    DataSourceNotFound(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("invalid time range: {0}")]
    TimeRange(String),
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Bad rule or notifier configuration. Terminal, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required setting '{0}'")]
    MissingSetting(String),
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: String, reason: String },
    #[error("unknown notifier type '{0}'")]
    UnknownNotifier(String),
    #[error("unknown condition type '{0}'")]
    UnknownCondition(String),
    #[error("invalid condition: {0}")]
    Condition(String),
    #[error("invalid rule: {0}")]
    Rule(String),
}

impl ValidationError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("cannot change state on paused alert")]
    AlertPaused,
    #[error("alert is already in state {0}")]
    AlreadyInState(AlertState),
    #[error("alert state changed concurrently (expected {expected}, found {found})")]
    StaleState {
        expected: AlertState,
        found: AlertState,
        since: DateTime<Utc>,
    },
    #[error("notification state version conflict")]
    VersionConflict,
    #[error("alert {0} not found")]
    AlertNotFound(i64),
    #[error("notification state {0} not found")]
    NotificationStateNotFound(i64),
    #[error("store: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook {url}: {reason}")]
    Webhook { url: String, reason: String },
    #[error("email: {0}")]
    Email(String),
    #[error("payload: {0}")]
    Payload(String),
    #[error("transport disabled")]
    TransportDisabled,
    #[error("notification cancelled")]
    Cancelled,
    #[error("notifications timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("render: {0}")]
    Render(String),
    #[error("upload: {0}")]
    Upload(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job for rule {rule_id} did not finish before shutdown")]
    ShutdownTimeout { rule_id: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_the_field() {
        let e = ValidationError::MissingSetting("addresses".into());
        assert!(e.to_string().contains("addresses"));
        let e = ValidationError::invalid("url", "relative URL without a base");
        assert!(e.to_string().contains("url"));
        assert!(e.to_string().contains("relative"));
    }

    #[test]
    fn store_conflicts_are_distinguishable() {
        assert_ne!(
            StoreError::AlertPaused,
            StoreError::AlreadyInState(AlertState::Ok)
        );
        assert!(StoreError::AlreadyInState(AlertState::Alerting)
            .to_string()
            .contains("alerting"));
    }
}
