//! Board registry: logical board name to current network address.
//!
//! DESIGN
//! ======
//! Boards announce themselves with `register(name, address)` at boot. The
//! newest registration always wins so a board that rebooted onto a new DHCP
//! lease takes over its slot immediately. Registration does not mark a
//! board `up`; only a liveness signal does.
//!
//! `lookup` returning `None` means "never registered, or cleared by the
//! liveness tracker", which is distinct from "registered but down".

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::state::{AlarmCommand, AppState, BoardName, BoardRecord, LivenessState, PendingCommand};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown board name: {0}")]
    UnknownBoard(String),
    #[error("board address must not be empty")]
    EmptyAddress,
}

impl crate::frame::ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownBoard(_) => "E_UNKNOWN_BOARD",
            Self::EmptyAddress => "E_EMPTY_ADDRESS",
        }
    }
}

/// Resolve a wire name to a known board.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownBoard`] when `raw` is not one of the fixed identities.
pub fn parse_name(raw: &str) -> Result<BoardName, RegistryError> {
    BoardName::parse(raw).ok_or_else(|| RegistryError::UnknownBoard(raw.to_string()))
}

/// Record `address` for `raw_name`, overwriting any previous address.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownBoard`] for a name outside the fixed set and
/// [`RegistryError::EmptyAddress`] for a blank address. Neither is retried.
pub async fn register(state: &AppState, raw_name: &str, address: &str) -> Result<BoardName, RegistryError> {
    let name = parse_name(raw_name)?;
    let address = address.trim();
    if address.is_empty() {
        return Err(RegistryError::EmptyAddress);
    }

    let mut boards = state.boards.write().await;
    let record = boards.entry(name).or_insert_with(|| BoardRecord::new(name));
    let previous = record.address.replace(address.to_string());
    record.registered_at = Some(Instant::now());
    record.failed_probes = 0;
    drop(boards);

    info!(board = %name, %address, previous = ?previous, "board registered");
    Ok(name)
}

/// Current address of `name`, if registered.
pub async fn lookup(state: &AppState, name: BoardName) -> Option<String> {
    state.boards.read().await.get(&name).and_then(|r| r.address.clone())
}

/// Point-in-time view of one board for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub name: BoardName,
    pub address: Option<String>,
    pub state: LivenessState,
    pub alarm_capable: bool,
    pub failed_probes: u32,
    pub seconds_since_contact: Option<u64>,
    pub pending_command: PendingCommand,
    pub last_command: Option<AlarmCommand>,
}

fn to_view(record: &BoardRecord, now: Instant) -> BoardView {
    BoardView {
        name: record.name,
        address: record.address.clone(),
        state: record.state,
        alarm_capable: record.name.has_alarm(),
        failed_probes: record.failed_probes,
        seconds_since_contact: record.last_contact.map(|at| now.saturating_duration_since(at).as_secs()),
        pending_command: record.pending,
        last_command: record.last_command,
    }
}

/// Every board in fixed order. Reads the last computed state; no network I/O.
pub async fn snapshot(state: &AppState) -> Vec<BoardView> {
    let now = Instant::now();
    let boards = state.boards.read().await;
    BoardName::ALL
        .into_iter()
        .filter_map(|name| boards.get(&name))
        .map(|record| to_view(record, now))
        .collect()
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
