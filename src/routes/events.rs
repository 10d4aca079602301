//! Sensor event routes. Boards post here; each call becomes a notification.

use axum::extract::{Json, State};
use axum::response::Response;
use serde::Deserialize;

use crate::routes::alarms::dispatch_error_to_status;
use crate::routes::{failure, success};
use crate::services::events;
use crate::state::{AppState, BoardName};

#[derive(Deserialize)]
pub struct MovementBody {
    /// Centimetres reported by the proximity sensor.
    pub distance: f64,
}

/// `POST /movement_event {distance}` and the door controller's
/// `POST /proximity_event {name, distance}`.
pub async fn movement_event(State(state): State<AppState>, Json(body): Json<MovementBody>) -> Response {
    events::movement_event(&state, body.distance);
    success("Movement Detected")
}

/// `POST /front_door_alarm`. The body, if any, is ignored.
pub async fn front_door_alarm(State(state): State<AppState>) -> Response {
    events::front_door_alarm(&state);
    success(events::FRONT_DOOR_ALARM_MESSAGE)
}

/// `POST /three_wrong_guesses`: lockout notification plus front-door alarm.
pub async fn three_wrong_guesses(State(state): State<AppState>) -> Response {
    match events::three_wrong_guesses(&state).await {
        Ok(ack) => success(format!("Alarm triggered on {}: {ack}", BoardName::FrontDoorEsp32)),
        Err(e) => failure(dispatch_error_to_status(&e), e.to_string()),
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
