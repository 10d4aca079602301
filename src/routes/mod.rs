//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Boards, the operator dashboard, and the camera viewer all talk to one
//! Axum router. Boards use the plain JSON endpoints; dashboards add a
//! websocket for real-time notifications. Every JSON reply carries the
//! `{status, message}` shape the board firmware and dashboard expect.

pub mod alarms;
pub mod boards;
pub mod camera;
pub mod events;
pub mod notifications;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/register", post(boards::register))
        .route("/status", get(boards::status_query).post(boards::status_body))
        .route("/heartbeat", get(boards::status_query).post(boards::status_body))
        .route("/send_status", post(boards::send_status))
        .route("/board_statuses", get(boards::board_statuses))
        .route("/movement_event", post(events::movement_event))
        .route("/proximity_event", post(events::movement_event))
        .route("/front_door_alarm", post(events::front_door_alarm))
        .route("/three_wrong_guesses", post(events::three_wrong_guesses))
        .route("/notifications", get(notifications::list))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        .route("/trigger_all_alarms", post(alarms::trigger_all_alarms))
        .route("/deactivate_all_alarms", post(alarms::deactivate_all_alarms))
        .route("/trigger_alarm", post(alarms::trigger_alarm))
        .route("/deactivate_alarm", post(alarms::deactivate_alarm))
        .route("/check_password", post(alarms::check_password))
        .route("/live_video", get(camera::live_video))
        .route("/capture_image", post(camera::capture_image))
        .route("/ws", get(ws::handle_ws))
        .route("/test", get(hub_test))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `{"status": "success", "message": ...}` with `200`.
pub(crate) fn success(message: impl Into<String>) -> Response {
    Json(json!({ "status": "success", "message": message.into() })).into_response()
}

/// `{"status": "failure", "message": ...}` with the given status code.
pub(crate) fn failure(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "status": "failure", "message": message.into() }))).into_response()
}

/// `GET /test`: boards ping this to find the hub.
async fn hub_test() -> Response {
    success("Hub is up")
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
