//! Alarm command dispatcher: activate/deactivate across boards.
//!
//! DESIGN
//! ======
//! Every command goes through [`deliver`], whose strategy is fixed at
//! start-up:
//!
//! - `Push`: the hub POSTs the command to the board right away. A board
//!   without an address or not currently `up` fails with `BoardUnreachable`
//!   without being contacted.
//! - `Pull`: the hub latches the command in the board's pending slot. The
//!   board receives it on its next heartbeat, exactly once. A newer command
//!   overwrites an older one; nothing is queued.
//!
//! Re-issuing a command is idempotent: the pending slot is simply set again,
//! and a pushed board only re-confirms its state.
//!
//! ERROR HANDLING
//! ==============
//! Operator calls are authorized before any board is touched. Fleet
//! commands run per-board deliveries concurrently and collect successes and
//! failures side by side; one dead board never aborts the batch. Single-board
//! commands surface the error directly. Nothing is retried by the hub.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::services::notifications::NotificationKind;
use crate::state::{AlarmCommand, AppState, BoardName, PendingCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Push,
    Pull,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unauthorized: invalid password")]
    Unauthorized,
    #[error("unknown board name: {0}")]
    UnknownBoard(String),
    #[error("{0} has no alarm")]
    NotAlarmCapable(BoardName),
    #[error("{board} is not registered or reachable: {reason}")]
    BoardUnreachable { board: BoardName, reason: String },
}

impl crate::frame::ErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::UnknownBoard(_) => "E_UNKNOWN_BOARD",
            Self::NotAlarmCapable(_) => "E_NOT_ALARM_CAPABLE",
            Self::BoardUnreachable { .. } => "E_BOARD_UNREACHABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::BoardUnreachable { .. })
    }
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BoardSuccess {
    pub board: BoardName,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardFailure {
    pub board: BoardName,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetStatus {
    Success,
    PartialSuccess,
    Failure,
}

/// Per-board outcomes of one fleet command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetResults {
    pub success: Vec<BoardSuccess>,
    pub failures: Vec<BoardFailure>,
}

impl FleetResults {
    #[must_use]
    pub fn status(&self) -> FleetStatus {
        match (self.success.is_empty(), self.failures.is_empty()) {
            (_, true) => FleetStatus::Success,
            (true, false) => FleetStatus::Failure,
            (false, false) => FleetStatus::PartialSuccess,
        }
    }
}

/// Outcome of one [`deliver`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Board acknowledgment (push) or queue confirmation (pull).
    pub message: String,
    /// `false` when the board already held this command and nothing changed.
    pub changed: bool,
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Check the operator credential.
///
/// # Errors
///
/// Returns [`DispatchError::Unauthorized`] on mismatch.
pub fn authorize(state: &AppState, password: &str) -> Result<(), DispatchError> {
    if password == state.config.operator_password {
        return Ok(());
    }
    warn!("alarm command rejected: bad operator password");
    Err(DispatchError::Unauthorized)
}

/// Deliver `command` to `board` with the configured strategy. Re-issuing a
/// command the board already holds only re-confirms it (`changed == false`).
///
/// # Errors
///
/// Returns [`DispatchError::BoardUnreachable`] when a pushed board is
/// unregistered, not `up`, or does not answer in time.
pub async fn deliver(state: &AppState, board: BoardName, command: AlarmCommand) -> Result<Delivered, DispatchError> {
    match state.config.delivery {
        Delivery::Push => push(state, board, command).await,
        Delivery::Pull => Ok(latch(state, board, command).await),
    }
}

async fn push(state: &AppState, board: BoardName, command: AlarmCommand) -> Result<Delivered, DispatchError> {
    let address = {
        let boards = state.boards.read().await;
        let record = boards.get(&board);
        match record.and_then(|r| r.address.clone()) {
            Some(address) if record.is_some_and(|r| r.is_up()) => address,
            Some(_) => {
                return Err(DispatchError::BoardUnreachable { board, reason: "board is down".into() });
            }
            None => {
                return Err(DispatchError::BoardUnreachable { board, reason: "board is not registered".into() });
            }
        }
    };

    let limit = state.config.board_timeouts.request();
    let ack = match tokio::time::timeout(limit, state.link.send_command(&address, command)).await {
        Ok(Ok(ack)) => ack,
        Ok(Err(e)) => {
            warn!(%board, %address, command = command.as_str(), error = %e, "alarm command failed");
            return Err(DispatchError::BoardUnreachable { board, reason: e.to_string() });
        }
        Err(_) => {
            warn!(%board, %address, command = command.as_str(), "alarm command timed out");
            return Err(DispatchError::BoardUnreachable { board, reason: "timed out".into() });
        }
    };

    let previous = state
        .boards
        .write()
        .await
        .get_mut(&board)
        .and_then(|record| record.last_command.replace(command));
    info!(%board, %address, command = command.as_str(), %ack, "alarm command delivered");
    Ok(Delivered { message: ack, changed: previous != Some(command) })
}

async fn latch(state: &AppState, board: BoardName, command: AlarmCommand) -> Delivered {
    let wanted = PendingCommand::from(command);
    let previous = {
        let mut boards = state.boards.write().await;
        boards.get_mut(&board).map_or(PendingCommand::None, |record| std::mem::replace(&mut record.pending, wanted))
    };

    if previous == wanted {
        return Delivered { message: format!("{} already pending for {board}", command.as_str()), changed: false };
    }
    info!(%board, command = command.as_str(), replaced = ?previous, "alarm command latched");
    Delivered { message: format!("{} queued for {board}", command.as_str()), changed: true }
}

/// Consume the pending command for `board`. Returns it once, then `None`.
pub async fn take_pending(state: &AppState, board: BoardName) -> PendingCommand {
    let mut boards = state.boards.write().await;
    let Some(record) = boards.get_mut(&board) else {
        return PendingCommand::None;
    };
    let pending = std::mem::take(&mut record.pending);
    match pending {
        PendingCommand::Activate => record.last_command = Some(AlarmCommand::Activate),
        PendingCommand::Deactivate => record.last_command = Some(AlarmCommand::Deactivate),
        PendingCommand::None => {}
    }
    pending
}

// =============================================================================
// OPERATOR COMMANDS
// =============================================================================

/// Apply `command` to every alarm-capable board.
///
/// # Errors
///
/// Returns [`DispatchError::Unauthorized`] before any board is contacted.
/// Per-board failures are reported inside [`FleetResults`].
pub async fn command_fleet(
    state: &AppState,
    command: AlarmCommand,
    password: &str,
) -> Result<FleetResults, DispatchError> {
    authorize(state, password)?;

    let deliveries = BoardName::alarm_capable().map(|board| async move { (board, deliver(state, board, command).await) });
    let mut results = FleetResults::default();
    let mut applied = Vec::new();
    for (board, outcome) in join_all(deliveries).await {
        match outcome {
            Ok(delivered) => {
                if delivered.changed {
                    applied.push(board);
                }
                results.success.push(BoardSuccess { board, message: delivered.message });
            }
            Err(e) => results.failures.push(BoardFailure { board, error: e.to_string() }),
        }
    }

    info!(
        command = command.as_str(),
        delivered = results.success.len(),
        failed = results.failures.len(),
        "fleet command finished"
    );
    announce(state, command, &applied);
    Ok(results)
}

/// Apply `command` to one board by wire name.
///
/// # Errors
///
/// Returns `Unauthorized`, `UnknownBoard`, `NotAlarmCapable`, or
/// `BoardUnreachable` directly.
pub async fn command_board(
    state: &AppState,
    raw_board: &str,
    command: AlarmCommand,
    password: &str,
) -> Result<String, DispatchError> {
    authorize(state, password)?;
    let board = BoardName::parse(raw_board).ok_or_else(|| DispatchError::UnknownBoard(raw_board.to_string()))?;
    if !board.has_alarm() {
        return Err(DispatchError::NotAlarmCapable(board));
    }

    let delivered = deliver(state, board, command).await?;
    if delivered.changed {
        announce(state, command, &[board]);
    }
    Ok(delivered.message)
}

/// Operator activations that newly changed at least one board become a
/// generic alarm notification.
fn announce(state: &AppState, command: AlarmCommand, boards: &[BoardName]) {
    if command != AlarmCommand::Activate || boards.is_empty() {
        return;
    }
    let names = boards.iter().map(|b| b.as_str()).collect::<Vec<_>>().join(", ");
    let message = match state.config.delivery {
        Delivery::Push => format!("Alarm activated on {names}"),
        Delivery::Pull => format!("Alarm activation queued for {names}"),
    };
    state.notifications.publish(NotificationKind::Alarm, message);
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
