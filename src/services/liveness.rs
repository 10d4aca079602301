//! Liveness tracker: up/down classification of every board.
//!
//! DESIGN
//! ======
//! One [`LivenessStrategy`] is selected at start-up:
//!
//! - `ActiveProbe`: a background task probes every registered board each
//!   interval. One success marks it `up`; it only goes `down` after
//!   `failure_threshold` consecutive failures, so a single dropped packet
//!   does not flap the state. Unregistered boards are never probed and are
//!   always `down`.
//! - `PassiveHeartbeat`: boards call in; each call marks them `up`. A board
//!   silent for longer than `stale_after` goes `down` and loses its address,
//!   forcing it to register again.
//!
//! The only transitions are `down → up` on a signal and `up → down` on the
//! failure threshold or staleness. A board is never `up` without an address.
//!
//! CONCURRENCY
//! ===========
//! Probes run with the board table unlocked. Results are applied only if
//! the board still has the address that was probed; a re-registration that
//! lands mid-probe wins over the stale result. Status queries only read the
//! last computed state and never wait on the network.

use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::{AppState, BoardName, BoardRecord, LivenessState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessStrategy {
    ActiveProbe { interval: Duration, failure_threshold: u32 },
    PassiveHeartbeat { stale_after: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `down → up`
    Recovered,
    /// `up → down`
    Lost,
}

fn mark_up(record: &mut BoardRecord) -> Option<Transition> {
    if record.state == LivenessState::Up {
        return None;
    }
    record.state = LivenessState::Up;
    Some(Transition::Recovered)
}

fn mark_down(record: &mut BoardRecord) -> Option<Transition> {
    if record.state == LivenessState::Down {
        return None;
    }
    record.state = LivenessState::Down;
    Some(Transition::Lost)
}

impl LivenessStrategy {
    /// The board called in (heartbeat or status poll).
    pub fn on_contact(&self, record: &mut BoardRecord, now: Instant) -> Option<Transition> {
        record.last_contact = Some(now);
        if record.address.is_none() {
            return None;
        }
        record.failed_probes = 0;
        mark_up(record)
    }

    /// Apply one probe result. No-op under passive heartbeat.
    pub fn on_probe(&self, record: &mut BoardRecord, ok: bool, now: Instant) -> Option<Transition> {
        let Self::ActiveProbe { failure_threshold, .. } = *self else {
            return None;
        };
        if ok {
            record.failed_probes = 0;
            record.last_contact = Some(now);
            return mark_up(record);
        }
        record.failed_probes = record.failed_probes.saturating_add(1);
        if record.failed_probes >= failure_threshold {
            return mark_down(record);
        }
        None
    }

    /// Time-based demotion. Under passive heartbeat a stale board goes down
    /// and is unregistered; a board that registered but never called in is
    /// measured from its registration.
    pub fn expire(&self, record: &mut BoardRecord, now: Instant) -> Option<Transition> {
        match *self {
            Self::ActiveProbe { .. } => {
                if record.address.is_none() {
                    return mark_down(record);
                }
                None
            }
            Self::PassiveHeartbeat { stale_after } => {
                record.address.as_ref()?;
                let reference = [record.last_contact, record.registered_at].into_iter().flatten().max()?;
                if now.saturating_duration_since(reference) <= stale_after {
                    return None;
                }
                record.address = None;
                record.registered_at = None;
                mark_down(record)
            }
        }
    }

    /// Period of the background task.
    #[must_use]
    pub fn tick(&self) -> Duration {
        match *self {
            Self::ActiveProbe { interval, .. } => interval.max(Duration::from_secs(1)),
            Self::PassiveHeartbeat { stale_after } => stale_after.max(Duration::from_secs(1)),
        }
    }
}

fn log_transition(name: BoardName, transition: Option<Transition>) {
    match transition {
        Some(Transition::Recovered) => info!(board = %name, "board recovered"),
        Some(Transition::Lost) => warn!(board = %name, "board lost"),
        None => {}
    }
}

// =============================================================================
// STATE OPERATIONS
// =============================================================================

/// Record an inbound liveness signal from `name`. A board that went stale
/// since the last sweep is expired first, so it loses its address and must
/// register again.
pub async fn record_contact(state: &AppState, name: BoardName) -> Option<Transition> {
    record_contact_at(state, name, Instant::now()).await
}

pub(crate) async fn record_contact_at(state: &AppState, name: BoardName, now: Instant) -> Option<Transition> {
    let strategy = state.config.liveness;
    let mut boards = state.boards.write().await;
    let record = boards.get_mut(&name)?;
    let expired = strategy.expire(record, now);
    let contact = strategy.on_contact(record, now);
    drop(boards);

    if expired.is_some() {
        info!(board = %name, "board unregistered after missing heartbeats");
        log_transition(name, expired);
    }
    log_transition(name, contact);
    contact.or(expired)
}

/// Apply time-based demotion to every board. Cheap; called lazily by status
/// queries and periodically by the heartbeat sweeper.
pub async fn sweep(state: &AppState) {
    sweep_at(state, Instant::now()).await;
}

pub(crate) async fn sweep_at(state: &AppState, now: Instant) {
    let strategy = state.config.liveness;
    let mut transitions = Vec::new();
    {
        let mut boards = state.boards.write().await;
        for record in boards.values_mut() {
            if let Some(t) = strategy.expire(record, now) {
                transitions.push((record.name, t));
            }
        }
    }
    for (name, t) in transitions {
        if t == Transition::Lost {
            info!(board = %name, "board unregistered after missing heartbeats");
        }
        log_transition(name, Some(t));
    }
}

/// Probe every registered board once, concurrently. Failures only update
/// internal state.
pub async fn probe_round(state: &AppState) {
    let targets: Vec<(BoardName, String)> = {
        let boards = state.boards.read().await;
        BoardName::ALL
            .into_iter()
            .filter_map(|name| boards.get(&name).and_then(|r| r.address.clone()).map(|a| (name, a)))
            .collect()
    };

    let probes = targets.into_iter().map(|(name, address)| async move {
        let result = state.link.probe(&address).await;
        if let Err(e) = &result {
            warn!(board = %name, %address, error = %e, "probe failed");
        } else {
            debug!(board = %name, %address, "probe ok");
        }
        (name, address, result.is_ok())
    });
    let results = join_all(probes).await;

    let strategy = state.config.liveness;
    let now = Instant::now();
    let mut transitions = Vec::new();
    {
        let mut boards = state.boards.write().await;
        for (name, address, ok) in results {
            let Some(record) = boards.get_mut(&name) else { continue };
            if record.address.as_deref() != Some(address.as_str()) {
                debug!(board = %name, %address, "discarding probe result for replaced address");
                continue;
            }
            transitions.push((name, strategy.on_probe(record, ok, now)));
        }
    }
    for (name, t) in transitions {
        log_transition(name, t);
    }
    sweep_at(state, now).await;
}

/// Spawn the liveness task for the configured strategy. Returns a handle for shutdown.
pub fn spawn_liveness_task(state: AppState) -> JoinHandle<()> {
    let strategy = state.config.liveness;
    let period = strategy.tick();
    info!(?strategy, period_ms = period.as_millis(), "liveness tracker configured");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match strategy {
                LivenessStrategy::ActiveProbe { .. } => probe_round(&state).await,
                LivenessStrategy::PassiveHeartbeat { .. } => sweep(&state).await,
            }
        }
    })
}

#[cfg(test)]
#[path = "liveness_test.rs"]
mod tests;
