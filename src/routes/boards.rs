//! Board-facing routes: registration, heartbeat/status reports, and the
//! status snapshot.

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::routes::{failure, success};
use crate::services::{dispatch, liveness, registry};
use crate::state::{AppState, BoardName, LivenessState, PendingCommand};

#[derive(Deserialize)]
pub struct RegisterBody {
    pub name: String,
    #[serde(alias = "address")]
    pub ip: String,
}

#[derive(Deserialize)]
pub struct StatusReport {
    pub name: String,
}

#[derive(Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    pub board: String,
    pub state: LivenessState,
    /// `false` tells a board whose address expired to register again.
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<&'static str>,
}

/// `POST /register`: record a board's current address.
pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterBody>) -> Response {
    match registry::register(&state, &body.name, &body.ip).await {
        Ok(name) => success(format!("{name} registered with IP {}", body.ip.trim())),
        Err(e) => failure(registry_error_to_status(&e), e.to_string()),
    }
}

/// `GET /status?name=` and `GET /heartbeat?name=`.
pub async fn status_query(State(state): State<AppState>, Query(report): Query<StatusReport>) -> Response {
    report_in(&state, &report.name).await
}

/// `POST /status` and `POST /heartbeat` with `{name}`.
pub async fn status_body(State(state): State<AppState>, Json(report): Json<StatusReport>) -> Response {
    report_in(&state, &report.name).await
}

/// `POST /send_status {message, name}`: the door controller's poll. The
/// latched command is carried in the status code alone: 202 none, 203
/// activate, 204 deactivate.
pub async fn send_status(State(state): State<AppState>, Json(report): Json<StatusReport>) -> Response {
    let name = match registry::parse_name(&report.name) {
        Ok(name) => name,
        Err(e) => return failure(registry_error_to_status(&e), e.to_string()),
    };

    let pending = check_in(&state, name).await.unwrap_or_default();
    debug!(board = %name, command = wire_command(pending), "board polled");
    pending_status(pending).into_response()
}

/// Record the liveness signal, then hand an alarm board its latched command.
async fn check_in(state: &AppState, name: BoardName) -> Option<PendingCommand> {
    liveness::record_contact(state, name).await;
    if !name.has_alarm() {
        return None;
    }
    Some(dispatch::take_pending(state, name).await)
}

async fn report_in(state: &AppState, raw_name: &str) -> Response {
    let name = match registry::parse_name(raw_name) {
        Ok(name) => name,
        Err(e) => return failure(registry_error_to_status(&e), e.to_string()),
    };

    let command = check_in(state, name).await.map(wire_command);

    let (registered, board_state) = {
        let boards = state.boards.read().await;
        boards
            .get(&name)
            .map_or((false, LivenessState::Down), |r| (r.address.is_some(), r.state))
    };
    debug!(board = %name, registered, command = command.unwrap_or("-"), "board reported in");

    Json(StatusReply { status: "success", board: name.to_string(), state: board_state, registered, command }).into_response()
}

fn wire_command(pending: PendingCommand) -> &'static str {
    match pending {
        PendingCommand::None => "no_command",
        PendingCommand::Activate => "activate_alarm",
        PendingCommand::Deactivate => "deactivate_alarm",
    }
}

pub(crate) fn pending_status(pending: PendingCommand) -> StatusCode {
    match pending {
        PendingCommand::None => StatusCode::ACCEPTED,
        PendingCommand::Activate => StatusCode::NON_AUTHORITATIVE_INFORMATION,
        PendingCommand::Deactivate => StatusCode::NO_CONTENT,
    }
}

/// `GET /board_statuses`: every board, after applying any due staleness.
pub async fn board_statuses(State(state): State<AppState>) -> Json<Vec<registry::BoardView>> {
    liveness::sweep(&state).await;
    Json(registry::snapshot(&state).await)
}

pub(crate) fn registry_error_to_status(err: &registry::RegistryError) -> StatusCode {
    match err {
        registry::RegistryError::UnknownBoard(_) | registry::RegistryError::EmptyAddress => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
