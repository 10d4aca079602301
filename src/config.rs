//! Hub configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::services::dispatch::Delivery;
use crate::services::liveness::LivenessStrategy;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_OPERATOR_PASSWORD: &str = "admin";
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PROBE_FAILURE_THRESHOLD: u32 = 2;
pub const DEFAULT_HEARTBEAT_STALE_SECS: u64 = 5;
pub const DEFAULT_BOARD_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_BOARD_CONNECT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_IMAGES_DIR: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Bounds on every outbound call the hub makes to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardTimeouts {
    pub request_ms: u64,
    pub connect_ms: u64,
}

impl BoardTimeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub port: u16,
    pub operator_password: String,
    pub liveness: LivenessStrategy,
    pub delivery: Delivery,
    pub board_timeouts: BoardTimeouts,
    /// Where `capture_image` stores camera snapshots.
    pub images_dir: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            operator_password: DEFAULT_OPERATOR_PASSWORD.into(),
            liveness: LivenessStrategy::ActiveProbe {
                interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
                failure_threshold: DEFAULT_PROBE_FAILURE_THRESHOLD,
            },
            delivery: Delivery::Push,
            board_timeouts: BoardTimeouts {
                request_ms: DEFAULT_BOARD_TIMEOUT_MS,
                connect_ms: DEFAULT_BOARD_CONNECT_TIMEOUT_MS,
            },
            images_dir: PathBuf::from(DEFAULT_IMAGES_DIR),
        }
    }
}

impl HubConfig {
    /// Build typed hub config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 5000
    /// - `HUB_OPERATOR_PASSWORD`: shared operator credential, default `admin`
    /// - `HUB_LIVENESS`: `probe` (default) or `heartbeat`
    /// - `HUB_PROBE_INTERVAL_SECS`: default 10
    /// - `HUB_PROBE_FAILURE_THRESHOLD`: default 2, must be at least 1
    /// - `HUB_HEARTBEAT_STALE_SECS`: default 5
    /// - `HUB_DELIVERY`: `push` (default) or `pull`
    /// - `HUB_BOARD_TIMEOUT_MS`: default 3000
    /// - `HUB_BOARD_CONNECT_TIMEOUT_MS`: default 1000
    /// - `HUB_IMAGES_DIR`: default `images`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an unknown liveness or delivery mode,
    /// or a zero probe failure threshold.
    pub fn from_env() -> Result<Self, ConfigError> {
        let liveness = parse_liveness(
            std::env::var("HUB_LIVENESS").ok().as_deref(),
            env_parse("HUB_PROBE_INTERVAL_SECS", DEFAULT_PROBE_INTERVAL_SECS),
            env_parse("HUB_PROBE_FAILURE_THRESHOLD", DEFAULT_PROBE_FAILURE_THRESHOLD),
            env_parse("HUB_HEARTBEAT_STALE_SECS", DEFAULT_HEARTBEAT_STALE_SECS),
        )?;
        let delivery = parse_delivery(std::env::var("HUB_DELIVERY").ok().as_deref())?;

        let operator_password = std::env::var("HUB_OPERATOR_PASSWORD").unwrap_or_else(|_| {
            tracing::warn!("HUB_OPERATOR_PASSWORD not set, using the default operator credential");
            DEFAULT_OPERATOR_PASSWORD.to_string()
        });

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            operator_password,
            liveness,
            delivery,
            board_timeouts: BoardTimeouts {
                request_ms: env_parse("HUB_BOARD_TIMEOUT_MS", DEFAULT_BOARD_TIMEOUT_MS),
                connect_ms: env_parse("HUB_BOARD_CONNECT_TIMEOUT_MS", DEFAULT_BOARD_CONNECT_TIMEOUT_MS),
            },
            images_dir: std::env::var("HUB_IMAGES_DIR").map_or_else(|_| PathBuf::from(DEFAULT_IMAGES_DIR), PathBuf::from),
        })
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_liveness(
    raw: Option<&str>,
    interval_secs: u64,
    failure_threshold: u32,
    stale_secs: u64,
) -> Result<LivenessStrategy, ConfigError> {
    match raw.unwrap_or("probe") {
        "probe" => {
            if failure_threshold == 0 {
                return Err(ConfigError::Parse("HUB_PROBE_FAILURE_THRESHOLD must be at least 1".into()));
            }
            Ok(LivenessStrategy::ActiveProbe { interval: Duration::from_secs(interval_secs), failure_threshold })
        }
        "heartbeat" => Ok(LivenessStrategy::PassiveHeartbeat { stale_after: Duration::from_secs(stale_secs) }),
        other => Err(ConfigError::Parse(format!(
            "unknown HUB_LIVENESS '{other}' (expected 'probe' or 'heartbeat')"
        ))),
    }
}

fn parse_delivery(raw: Option<&str>) -> Result<Delivery, ConfigError> {
    match raw.unwrap_or("push") {
        "push" => Ok(Delivery::Push),
        "pull" => Ok(Delivery::Pull),
        other => Err(ConfigError::Parse(format!("unknown HUB_DELIVERY '{other}' (expected 'push' or 'pull')"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
