//! Board link: outbound HTTP calls from the hub to a board.
//!
//! DESIGN
//! ======
//! The hub reaches boards for two things: a reachability probe
//! (`GET /test`) and alarm commands (`POST /activate_alarm`,
//! `POST /deactivate_alarm`). Both go through the [`BoardLink`] trait so the
//! liveness task and the dispatcher can be exercised against a mock.
//!
//! Every call is bounded by the client's request and connect timeouts; a
//! hung board surfaces as a [`LinkError::Request`] for that board only.

use serde::Deserialize;

use crate::config::BoardTimeouts;
use crate::state::AlarmCommand;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("http client build failed: {0}")]
    ClientBuild(String),
    #[error("request to {address} failed: {reason}")]
    Request { address: String, reason: String },
    #[error("board at {address} answered status {status}")]
    Status { address: String, status: u16 },
}

/// Provider-neutral seam for talking to boards. Enables mocking in tests.
#[async_trait::async_trait]
pub trait BoardLink: Send + Sync {
    /// Lightweight reachability check.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the board does not answer `200` in time.
    async fn probe(&self, address: &str) -> Result<(), LinkError>;

    /// Deliver an alarm command and return the board's acknowledgment text.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] on network failure, timeout, or non-2xx status.
    async fn send_command(&self, address: &str, command: AlarmCommand) -> Result<String, LinkError>;
}

// =============================================================================
// HTTP LINK
// =============================================================================

pub struct HttpBoardLink {
    http: reqwest::Client,
}

impl HttpBoardLink {
    /// Build a link whose every call is bounded by `timeouts`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(timeouts: BoardTimeouts) -> Result<Self, LinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| LinkError::ClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[derive(Deserialize)]
struct BoardReply {
    message: String,
}

#[async_trait::async_trait]
impl BoardLink for HttpBoardLink {
    async fn probe(&self, address: &str) -> Result<(), LinkError> {
        let response = self
            .http
            .get(board_url(address, "/test"))
            .send()
            .await
            .map_err(|e| request_error(address, &e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(LinkError::Status { address: address.to_string(), status: status.as_u16() });
        }
        Ok(())
    }

    async fn send_command(&self, address: &str, command: AlarmCommand) -> Result<String, LinkError> {
        let action = match command {
            AlarmCommand::Activate => "activate",
            AlarmCommand::Deactivate => "deactivate",
        };
        let response = self
            .http
            .post(board_url(address, command.path()))
            .json(&serde_json::json!({ "action": action }))
            .send()
            .await
            .map_err(|e| request_error(address, &e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| request_error(address, &e))?;
        if !status.is_success() {
            return Err(LinkError::Status { address: address.to_string(), status: status.as_u16() });
        }

        Ok(parse_ack(&text))
    }
}

/// Boards answer with plain text ("Alarm activated!"); some firmware wraps it
/// as `{"message": ...}`.
pub(crate) fn parse_ack(body: &str) -> String {
    serde_json::from_str::<BoardReply>(body)
        .map(|reply| reply.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Board addresses are registered as bare `host[:port]`.
pub(crate) fn board_url(address: &str, path: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}{path}", address.trim_end_matches('/'))
    } else {
        format!("http://{address}{path}")
    }
}

fn request_error(address: &str, err: &reqwest::Error) -> LinkError {
    let reason = if err.is_timeout() { "timed out".to_string() } else { err.to_string() };
    LinkError::Request { address: address.to_string(), reason }
}

// =============================================================================
// MOCK
// =============================================================================


#[cfg(test)]
#[path = "link_test.rs"]
mod tests;
