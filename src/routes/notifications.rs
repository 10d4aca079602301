//! Notification snapshot routes for clients that poll instead of holding a
//! websocket.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::routes::failure;
use crate::services::notifications::{Notification, NotificationError};
use crate::state::AppState;

/// `GET /notifications`: whole queue, oldest first.
pub async fn list(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.read())
}

/// `PUT /notifications/{id}/read`.
pub async fn mark_read(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.notifications.mark_read(id) {
        Ok(notification) => Json(notification).into_response(),
        Err(e) => failure(notification_error_to_status(&e), e.to_string()),
    }
}

pub(crate) fn notification_error_to_status(err: &NotificationError) -> StatusCode {
    match err {
        NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
