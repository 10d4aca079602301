//! Operator alarm routes. Every command is password-checked before any
//! board is contacted.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::routes::{failure, success};
use crate::services::dispatch::{self, DispatchError, FleetStatus};
use crate::state::{AlarmCommand, AppState};

#[derive(Deserialize)]
pub struct PasswordBody {
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct BoardCommandBody {
    #[serde(alias = "name")]
    pub board: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /trigger_all_alarms`: 200 all reached, 207 some, 503 none.
pub async fn trigger_all_alarms(State(state): State<AppState>, Json(body): Json<PasswordBody>) -> Response {
    fleet(&state, AlarmCommand::Activate, &body.password).await
}

/// `POST /deactivate_all_alarms`: same status mapping as activation.
pub async fn deactivate_all_alarms(State(state): State<AppState>, Json(body): Json<PasswordBody>) -> Response {
    fleet(&state, AlarmCommand::Deactivate, &body.password).await
}

/// `POST /trigger_alarm {board, password}`.
pub async fn trigger_alarm(State(state): State<AppState>, Json(body): Json<BoardCommandBody>) -> Response {
    single(&state, &body, AlarmCommand::Activate).await
}

/// `POST /deactivate_alarm {board, password}`.
pub async fn deactivate_alarm(State(state): State<AppState>, Json(body): Json<BoardCommandBody>) -> Response {
    single(&state, &body, AlarmCommand::Deactivate).await
}

/// `POST /check_password`: lets the dashboard validate before sending commands.
pub async fn check_password(State(state): State<AppState>, Json(body): Json<PasswordBody>) -> Response {
    match dispatch::authorize(&state, &body.password) {
        Ok(()) => success("Password is correct"),
        Err(e) => failure(dispatch_error_to_status(&e), "Incorrect password"),
    }
}

async fn fleet(state: &AppState, command: AlarmCommand, password: &str) -> Response {
    let results = match dispatch::command_fleet(state, command, password).await {
        Ok(results) => results,
        Err(e) => return failure(dispatch_error_to_status(&e), e.to_string()),
    };

    let status = results.status();
    let verb = match command {
        AlarmCommand::Activate => "triggered",
        AlarmCommand::Deactivate => "deactivated",
    };
    let message = match status {
        FleetStatus::Success => format!("All alarms {verb}"),
        FleetStatus::PartialSuccess => format!("Some alarms {verb}; some boards failed"),
        FleetStatus::Failure => format!("No alarms {verb}"),
    };
    let body = json!({ "status": status, "message": message, "results": results });
    (fleet_status_code(status), Json(body)).into_response()
}

async fn single(state: &AppState, body: &BoardCommandBody, command: AlarmCommand) -> Response {
    match dispatch::command_board(state, &body.board, command, &body.password).await {
        Ok(ack) => success(format!("{} on {}: {ack}", command.as_str(), body.board)),
        Err(e) => failure(dispatch_error_to_status(&e), e.to_string()),
    }
}

pub(crate) fn fleet_status_code(status: FleetStatus) -> StatusCode {
    match status {
        FleetStatus::Success => StatusCode::OK,
        FleetStatus::PartialSuccess => StatusCode::MULTI_STATUS,
        FleetStatus::Failure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn dispatch_error_to_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::Unauthorized => StatusCode::UNAUTHORIZED,
        DispatchError::UnknownBoard(_) | DispatchError::NotAlarmCapable(_) => StatusCode::BAD_REQUEST,
        DispatchError::BoardUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[path = "alarms_test.rs"]
mod tests;
