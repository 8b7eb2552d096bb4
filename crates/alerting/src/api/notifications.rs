use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::state::ApiState;
use crate::store::NotificationConfig;

#[derive(Serialize)]
pub struct TestNotificationResponse {
    pub success: bool,
    pub message: String,
}

/// Sends a synthetic alert through the posted channel configuration.
pub async fn test_notification(
    State(state): State<ApiState>,
    Json(config): Json<NotificationConfig>,
) -> Json<TestNotificationResponse> {
    match state.notifications.send_test(&config).await {
        Ok(()) => Json(TestNotificationResponse {
            success: true,
            message: format!("test notification sent via {}", config.notifier_type),
        }),
        Err(e) => {
            tracing::warn!(notifier = %config.notifier_type, error = %e, "test notification failed");
            Json(TestNotificationResponse {
                success: false,
                message: e.to_string(),
            })
        }
    }
}
