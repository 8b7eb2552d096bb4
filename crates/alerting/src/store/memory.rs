use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;

use super::models::{
    Annotation, NotificationConfig, NotificationState, NotificationStateKind, SetAlertState,
    SetNotificationPending, StateChange,
};
use super::AlertStore;
use crate::alert::{AlertState, RuleDefinition};
use crate::error::StoreError;

/// In-process store used by the binary and by tests.
#[derive(Clone)]
pub struct MemoryStore {
    rules: Arc<DashMap<i64, RuleDefinition>>,
    notifications: Arc<DashMap<String, NotificationConfig>>,
    notification_states: Arc<DashMap<i64, NotificationState>>,
    state_index: Arc<DashMap<(i64, i64, i64), i64>>,
    annotations: Arc<Mutex<Vec<Annotation>>>,
    next_state_id: Arc<AtomicI64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            notifications: Arc::new(DashMap::new()),
            notification_states: Arc::new(DashMap::new()),
            state_index: Arc::new(DashMap::new()),
            annotations: Arc::new(Mutex::new(Vec::new())),
            next_state_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn seeded(rules: Vec<RuleDefinition>, notifications: Vec<NotificationConfig>) -> Self {
        let store = Self::new();
        for r in rules {
            store.insert_rule(r);
        }
        for n in notifications {
            store.insert_notification(n);
        }
        store
    }

    pub fn insert_rule(&self, rule: RuleDefinition) {
        self.rules.insert(rule.id, rule);
    }

    pub fn insert_notification(&self, config: NotificationConfig) {
        self.notifications.insert(config.uid.clone(), config);
    }

    pub fn rule(&self, id: i64) -> Option<RuleDefinition> {
        self.rules.get(&id).map(|r| r.clone())
    }

    /// Pausing parks the rule in `Paused`; resuming resets it to `Unknown`.
    pub fn pause_rule(&self, id: i64, paused: bool) -> Result<(), StoreError> {
        let mut rule = self.rules.get_mut(&id).ok_or(StoreError::AlertNotFound(id))?;
        rule.state = if paused {
            AlertState::Paused
        } else {
            AlertState::Unknown
        };
        rule.new_state_date = Utc::now();
        Ok(())
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.annotations
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn notification_state(&self, id: i64) -> Option<NotificationState> {
        self.notification_states.get(&id).map(|s| s.clone())
    }
}

#[async_trait::async_trait]
impl AlertStore for MemoryStore {
    async fn list_rules(&self) -> Result<Vec<RuleDefinition>, StoreError> {
        let mut rules: Vec<RuleDefinition> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn set_alert_state(&self, cmd: SetAlertState) -> Result<StateChange, StoreError> {
        let mut rule = self
            .rules
            .get_mut(&cmd.alert_id)
            .ok_or(StoreError::AlertNotFound(cmd.alert_id))?;

        if rule.state == AlertState::Paused {
            return Err(StoreError::AlertPaused);
        }
        if rule.state == cmd.state {
            return Err(StoreError::AlreadyInState(cmd.state));
        }
        if rule.state != cmd.expected {
            return Err(StoreError::StaleState {
                expected: cmd.expected,
                found: rule.state,
                since: rule.new_state_date,
            });
        }

        rule.state = cmd.state;
        rule.state_changes += 1;
        rule.new_state_date = Utc::now();

        Ok(StateChange {
            state_changes: rule.state_changes,
        })
    }

    async fn save_annotation(&self, item: Annotation) -> Result<(), StoreError> {
        self.annotations
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .push(item);
        Ok(())
    }

    async fn notifications_to_send(
        &self,
        org_id: i64,
        uids: &[String],
    ) -> Result<Vec<NotificationConfig>, StoreError> {
        let mut out: Vec<NotificationConfig> = self
            .notifications
            .iter()
            .filter(|n| n.org_id == org_id && (n.is_default || uids.contains(&n.uid)))
            .map(|n| n.value().clone())
            .collect();
        out.sort_by_key(|n| n.id);
        Ok(out)
    }

    async fn get_or_create_notification_state(
        &self,
        org_id: i64,
        alert_id: i64,
        notifier_id: i64,
    ) -> Result<NotificationState, StoreError> {
        let id = *self
            .state_index
            .entry((org_id, alert_id, notifier_id))
            .or_insert_with(|| {
                let id = self.next_state_id.fetch_add(1, Ordering::Relaxed);
                self.notification_states.insert(
                    id,
                    NotificationState {
                        id,
                        org_id,
                        alert_id,
                        notifier_id,
                        state: NotificationStateKind::Unknown,
                        version: 0,
                        updated_at: 0,
                        alert_rule_state_updated_version: 0,
                    },
                );
                id
            });

        self.notification_states
            .get(&id)
            .map(|s| s.clone())
            .ok_or(StoreError::NotificationStateNotFound(id))
    }

    async fn set_notification_state_pending(
        &self,
        cmd: SetNotificationPending,
    ) -> Result<i64, StoreError> {
        let mut state = self
            .notification_states
            .get_mut(&cmd.id)
            .ok_or(StoreError::NotificationStateNotFound(cmd.id))?;

        let claimable = state.version == cmd.version
            || state.alert_rule_state_updated_version < cmd.alert_rule_state_updated_version;
        if !claimable {
            return Err(StoreError::VersionConflict);
        }

        state.version += 1;
        state.state = NotificationStateKind::Pending;
        state.updated_at = Utc::now().timestamp();
        state.alert_rule_state_updated_version = cmd.alert_rule_state_updated_version;
        Ok(state.version)
    }

    async fn set_notification_state_complete(&self, id: i64, version: i64) -> Result<(), StoreError> {
        let mut state = self
            .notification_states
            .get_mut(&id)
            .ok_or(StoreError::NotificationStateNotFound(id))?;

        if state.version != version {
            tracing::warn!(
                notification_state = id,
                expected = version,
                found = state.version,
                "notification state changed while sending"
            );
        }

        state.version += 1;
        state.state = NotificationStateKind::Completed;
        state.updated_at = Utc::now().timestamp();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rule(id: i64, state: AlertState) -> RuleDefinition {
        RuleDefinition {
            id,
            org_id: 1,
            dashboard_id: 0,
            dashboard_uid: String::new(),
            panel_id: 0,
            name: format!("rule-{id}"),
            message: String::new(),
            frequency: Duration::from_secs(60),
            for_duration: Duration::ZERO,
            conditions: vec![],
            notifications: vec![],
            no_data_state: Default::default(),
            execution_error_state: Default::default(),
            tags: Default::default(),
            state,
            state_changes: 0,
            new_state_date: Default::default(),
        }
    }

    fn channel(id: i64, uid: &str, is_default: bool) -> NotificationConfig {
        NotificationConfig {
            id,
            uid: uid.into(),
            org_id: 1,
            name: uid.into(),
            notifier_type: "webhook".into(),
            is_default,
            send_reminder: false,
            disable_resolve_message: false,
            upload_image: false,
            frequency: Duration::ZERO,
            settings: serde_json::json!({}),
        }
    }

    fn set(expected: AlertState, state: AlertState) -> SetAlertState {
        SetAlertState {
            alert_id: 1,
            org_id: 1,
            expected,
            state,
            error: None,
            eval_data: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn conditional_state_update() {
        let store = MemoryStore::seeded(vec![rule(1, AlertState::Ok)], vec![]);

        let change = store.set_alert_state(set(AlertState::Ok, AlertState::Alerting)).await.unwrap();
        assert_eq!(change.state_changes, 1);
        assert_eq!(store.rule(1).unwrap().state, AlertState::Alerting);

        let err = store.set_alert_state(set(AlertState::Ok, AlertState::Alerting)).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyInState(AlertState::Alerting));

        let err = store.set_alert_state(set(AlertState::Ok, AlertState::NoData)).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleState { found: AlertState::Alerting, .. }));
    }

    #[tokio::test]
    async fn paused_rule_rejects_state_change() {
        let store = MemoryStore::seeded(vec![rule(1, AlertState::Ok)], vec![]);
        store.pause_rule(1, true).unwrap();
        let err = store.set_alert_state(set(AlertState::Ok, AlertState::Alerting)).await.unwrap_err();
        assert_eq!(err, StoreError::AlertPaused);

        store.pause_rule(1, false).unwrap();
        assert_eq!(store.rule(1).unwrap().state, AlertState::Unknown);
    }

    #[tokio::test]
    async fn defaults_always_included() {
        let store = MemoryStore::seeded(
            vec![],
            vec![channel(1, "ops", false), channel(2, "all", true), channel(3, "dev", false)],
        );
        let found = store.notifications_to_send(1, &["dev".to_string()]).await.unwrap();
        let uids: Vec<&str> = found.iter().map(|n| n.uid.as_str()).collect();
        assert_eq!(uids, vec!["all", "dev"]);

        assert!(store.notifications_to_send(2, &["dev".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_state_is_created_once() {
        let store = MemoryStore::new();
        let a = store.get_or_create_notification_state(1, 10, 5).await.unwrap();
        let b = store.get_or_create_notification_state(1, 10, 5).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.state, NotificationStateKind::Unknown);
    }

    #[tokio::test]
    async fn pending_claim_uses_version() {
        let store = MemoryStore::new();
        let s = store.get_or_create_notification_state(1, 10, 5).await.unwrap();

        let claim = SetNotificationPending { id: s.id, version: s.version, alert_rule_state_updated_version: 1 };
        let v = store.set_notification_state_pending(claim).await.unwrap();
        assert_eq!(v, 1);

        // a second sender holding the old version for the same state change loses
        let err = store.set_notification_state_pending(claim).await.unwrap_err();
        assert_eq!(err, StoreError::VersionConflict);

        // a newer state change may claim again
        let newer = SetNotificationPending { alert_rule_state_updated_version: 2, ..claim };
        assert_eq!(store.set_notification_state_pending(newer).await.unwrap(), 2);

        store.set_notification_state_complete(s.id, 2).await.unwrap();
        let done = store.notification_state(s.id).unwrap();
        assert_eq!(done.state, NotificationStateKind::Completed);
        assert_eq!(done.version, 3);
    }

    #[tokio::test]
    async fn annotations_are_recorded() {
        let store = MemoryStore::new();
        store
            .save_annotation(Annotation {
                id: "a".into(),
                org_id: 1,
                dashboard_id: 0,
                panel_id: 0,
                alert_id: 1,
                prev_state: AlertState::Ok,
                new_state: AlertState::Alerting,
                text: String::new(),
                epoch_ms: 0,
                data: serde_json::Value::Null,
            })
            .await
            .unwrap();
        assert_eq!(store.annotations().len(), 1);
    }
}
