//! Persistence collaborator.
//!
//! The engine only talks to storage through [`AlertStore`]. State writes are
//! conditional so that concurrent evaluations of the same rule cannot clobber
//! each other's transition.

mod memory;
mod models;

use crate::alert::RuleDefinition;
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use models::{
    Annotation, NotificationConfig, NotificationState, NotificationStateKind, SetAlertState,
    SetNotificationPending, StateChange,
};

#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<RuleDefinition>, StoreError>;

    /// Fails with `AlertPaused` on a paused rule, `AlreadyInState` when the
    /// rule already holds the target state and `StaleState` when another
    /// writer moved it away from the expected state.
    async fn set_alert_state(&self, cmd: SetAlertState) -> Result<StateChange, StoreError>;

    async fn save_annotation(&self, item: Annotation) -> Result<(), StoreError>;

    /// Channels referenced by `uids` plus every default channel of the org.
    async fn notifications_to_send(
        &self,
        org_id: i64,
        uids: &[String],
    ) -> Result<Vec<NotificationConfig>, StoreError>;

    async fn get_or_create_notification_state(
        &self,
        org_id: i64,
        alert_id: i64,
        notifier_id: i64,
    ) -> Result<NotificationState, StoreError>;

    /// Returns the new version, or `VersionConflict` when another sender
    /// already claimed this notification.
    async fn set_notification_state_pending(
        &self,
        cmd: SetNotificationPending,
    ) -> Result<i64, StoreError>;

    async fn set_notification_state_complete(&self, id: i64, version: i64) -> Result<(), StoreError>;
}
