//! Board-originated events. Each one becomes a notification; a lockout
//! additionally sounds the front-door alarm.

use tracing::warn;

use crate::services::dispatch::{self, DispatchError};
use crate::services::notifications::{Notification, NotificationKind};
use crate::state::{AlarmCommand, AppState, BoardName};

pub const FRONT_DOOR_ALARM_MESSAGE: &str = "Front Door Alarm Triggered";
pub const LOCKOUT_MESSAGE: &str = "Proximity sensor three wrong guesses";

pub fn movement_event(state: &AppState, distance: f64) -> Notification {
    state
        .notifications
        .publish(NotificationKind::MovementEvent, format!("Movement Detected: {distance} cm"))
}

pub fn front_door_alarm(state: &AppState) -> Notification {
    state.notifications.publish(NotificationKind::FrontDoorAlarm, FRONT_DOOR_ALARM_MESSAGE)
}

/// Publish the lockout notification, then activate the front-door alarm.
/// The board itself raised the event, so no operator credential applies.
///
/// # Errors
///
/// Returns the dispatcher's error when the front door cannot be reached.
/// The notification is published either way.
pub async fn three_wrong_guesses(state: &AppState) -> Result<String, DispatchError> {
    state.notifications.publish(NotificationKind::ThreeWrongGuesses, LOCKOUT_MESSAGE);
    dispatch::deliver(state, BoardName::FrontDoorEsp32, AlarmCommand::Activate)
        .await
        .map(|delivered| delivered.message)
        .inspect_err(|e| warn!(error = %e, "lockout could not sound the front-door alarm"))
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
