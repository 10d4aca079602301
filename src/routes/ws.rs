//! WebSocket handler: real-time notification channel.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, subscribes it to the notification bus
//! and enters a `select!` loop:
//! - Notifications published on the bus → `new-notification` frame
//! - Incoming client frames → parse + dispatch by syscall prefix
//!
//! Handlers return the reply payload or an error frame; only the loop
//! writes to the socket.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → subscribe → send `session:connected` with `client_id`
//! 2. Bus publishes → forward as `new-notification`
//! 3. Client sends `notifications:list` / `notifications:read` → reply
//! 4. Close → unsubscribe

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status};
use crate::services::notifications::Notification;
use crate::state::AppState;

/// Server-pushed frame carrying one freshly published notification.
pub const NEW_NOTIFICATION: &str = "new-notification";

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let mut notifications = state.notifications.subscribe(client_id);

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        state.notifications.unsubscribe(client_id);
        return;
    }

    info!(%client_id, subscribers = state.notifications.subscriber_count(), "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, client_id, &text) {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(notification) = notifications.recv() => {
                let frame = Frame::request(NEW_NOTIFICATION, notification_data(&notification));
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    state.notifications.unsubscribe(client_id);
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    let result = match req.prefix() {
        "notifications" => handle_notifications(state, &req),
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(data) => vec![req.done_with(data)],
        Err(err_frame) => vec![err_frame],
    }
}

fn handle_notifications(state: &AppState, req: &Frame) -> Result<Data, Frame> {
    let op = req.syscall.split_once(':').map_or("", |(_, op)| op);

    match op {
        "list" => {
            let mut data = Data::new();
            data.insert("notifications".into(), serde_json::to_value(state.notifications.read()).unwrap_or_default());
            Ok(data)
        }
        "read" => {
            let Some(id) = req.data.get("id").and_then(serde_json::Value::as_u64) else {
                return Err(req.error("id required"));
            };
            match state.notifications.mark_read(id) {
                Ok(notification) => Ok(notification_data(&notification)),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        _ => Err(req.error(format!("unknown notifications op: {op}"))),
    }
}

/// Notification fields flattened into frame data.
fn notification_data(notification: &Notification) -> Data {
    serde_json::to_value(notification)
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame.data.get("message").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
