use axum::{Json, extract::State};

use bulletin_types::api::NotificationStatus;

use crate::state::AppState;

/// Broadcast a test message. Always 200; the delivery outcome is in the body.
pub async fn send_test(State(state): State<AppState>) -> Json<NotificationStatus> {
    Json(state.coordinator.send_test_notification().await)
}
