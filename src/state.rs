//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to the liveness task. It owns the board table (address, liveness,
//! pending command per board) and the notification bus. Nothing else in the
//! process mutates either; there are no module-level globals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::HubConfig;
use crate::services::link::BoardLink;
use crate::services::notifications::NotificationBus;

// =============================================================================
// BOARD IDENTITY
// =============================================================================

/// The closed set of boards the hub knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoardName {
    EntranceCamera,
    #[serde(rename = "FrontDoorESP32")]
    FrontDoorEsp32,
    ProximityBoard,
}

impl BoardName {
    pub const ALL: [BoardName; 3] = [BoardName::EntranceCamera, BoardName::FrontDoorEsp32, BoardName::ProximityBoard];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntranceCamera => "EntranceCamera",
            Self::FrontDoorEsp32 => "FrontDoorESP32",
            Self::ProximityBoard => "ProximityBoard",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == raw)
    }

    /// Whether the board drives a buzzer/siren. Fixed per identity.
    #[must_use]
    pub fn has_alarm(self) -> bool {
        matches!(self, Self::FrontDoorEsp32 | Self::ProximityBoard)
    }

    /// Boards targeted by fleet-wide alarm commands, in fixed order.
    pub fn alarm_capable() -> impl Iterator<Item = BoardName> {
        Self::ALL.into_iter().filter(|name| name.has_alarm())
    }
}

impl std::fmt::Display for BoardName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BOARD STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCommand {
    Activate,
    Deactivate,
}

impl AlarmCommand {
    /// Board endpoint that executes the command.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Activate => "/activate_alarm",
            Self::Deactivate => "/deactivate_alarm",
        }
    }

    /// Wire name used in heartbeat replies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate_alarm",
            Self::Deactivate => "deactivate_alarm",
        }
    }
}

/// Latched instruction awaiting a board that polls instead of being pushed to.
/// Holding a single value makes "activate and deactivate both pending"
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCommand {
    #[default]
    None,
    Activate,
    Deactivate,
}

impl From<AlarmCommand> for PendingCommand {
    fn from(command: AlarmCommand) -> Self {
        match command {
            AlarmCommand::Activate => Self::Activate,
            AlarmCommand::Deactivate => Self::Deactivate,
        }
    }
}

/// Live record for one board. Kept for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct BoardRecord {
    pub name: BoardName,
    /// `None` while unregistered.
    pub address: Option<String>,
    pub state: LivenessState,
    /// Consecutive failed probes (active-probe liveness only).
    pub failed_probes: u32,
    pub last_contact: Option<Instant>,
    pub registered_at: Option<Instant>,
    pub pending: PendingCommand,
    /// Last command the board acknowledged.
    pub last_command: Option<AlarmCommand>,
}

impl BoardRecord {
    #[must_use]
    pub fn new(name: BoardName) -> Self {
        Self {
            name,
            address: None,
            state: LivenessState::Down,
            failed_probes: 0,
            last_contact: None,
            registered_at: None,
            pending: PendingCommand::None,
            last_command: None,
        }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.state == LivenessState::Up
    }
}

pub type BoardTable = HashMap<BoardName, BoardRecord>;

/// Fresh table with every known board unregistered and down.
#[must_use]
pub fn new_board_table() -> BoardTable {
    BoardName::ALL.into_iter().map(|name| (name, BoardRecord::new(name))).collect()
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state. Clone is required by Axum; every field is
/// Arc-wrapped or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub boards: Arc<RwLock<BoardTable>>,
    pub notifications: NotificationBus,
    /// Probe and command channel to the boards.
    pub link: Arc<dyn BoardLink>,
    /// Plain client for camera pass-through (no total timeout, streams are long-lived).
    pub http: reqwest::Client,
    pub config: Arc<HubConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: HubConfig, link: Arc<dyn BoardLink>, http: reqwest::Client) -> Self {
        Self {
            boards: Arc::new(RwLock::new(new_board_table())),
            notifications: NotificationBus::new(),
            link,
            http,
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
