use super::*;
use std::sync::Arc;

use crate::config::HubConfig;
use crate::services::link::mock::MockLink;
use crate::services::link::{BoardLink, LinkError};
use crate::services::registry;
use crate::state::{AlarmCommand, BoardTable, test_helpers};
use tokio::sync::RwLock;

const PROBE: LivenessStrategy = LivenessStrategy::ActiveProbe { interval: Duration::from_secs(10), failure_threshold: 2 };
const HEARTBEAT: LivenessStrategy = LivenessStrategy::PassiveHeartbeat { stale_after: Duration::from_secs(5) };

fn registered(name: BoardName) -> BoardRecord {
    let mut record = BoardRecord::new(name);
    record.address = Some("10.0.0.5".into());
    record.registered_at = Some(Instant::now());
    record
}

fn state_with(strategy: LivenessStrategy, link: Arc<MockLink>) -> AppState {
    let config = HubConfig { liveness: strategy, ..HubConfig::default() };
    test_helpers::test_app_state_with(config, link)
}

// =========================================================================
// ActiveProbe
// =========================================================================

#[test]
fn probe_requires_threshold_consecutive_failures() {
    let now = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);

    assert_eq!(PROBE.on_probe(&mut record, true, now), Some(Transition::Recovered));
    assert_eq!(PROBE.on_probe(&mut record, false, now), None);
    assert_eq!(record.state, LivenessState::Up);
    assert_eq!(record.failed_probes, 1);
    assert_eq!(PROBE.on_probe(&mut record, false, now), Some(Transition::Lost));
    assert_eq!(record.state, LivenessState::Down);
}

#[test]
fn probe_success_between_failures_resets_counter() {
    let now = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);
    PROBE.on_probe(&mut record, true, now);
    PROBE.on_probe(&mut record, false, now);
    PROBE.on_probe(&mut record, true, now);
    assert_eq!(record.failed_probes, 0);
    assert_eq!(PROBE.on_probe(&mut record, false, now), None);
    assert_eq!(record.state, LivenessState::Up);
}

#[test]
fn probe_failures_keep_a_down_board_down_without_transition() {
    let now = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);
    assert_eq!(PROBE.on_probe(&mut record, false, now), None);
    assert_eq!(PROBE.on_probe(&mut record, false, now), None);
    assert_eq!(PROBE.on_probe(&mut record, false, now), None);
    assert_eq!(record.state, LivenessState::Down);
    assert_eq!(record.failed_probes, 3);
}

#[test]
fn probe_mode_reports_unregistered_board_down() {
    let mut record = BoardRecord::new(BoardName::EntranceCamera);
    record.state = LivenessState::Up;
    assert_eq!(PROBE.expire(&mut record, Instant::now()), Some(Transition::Lost));
}

#[tokio::test]
async fn probe_round_skips_unregistered_boards() {
    let link = Arc::new(MockLink::new());
    let state = state_with(PROBE, link.clone());
    registry::register(&state, "FrontDoorESP32", "10.0.0.2").await.unwrap();

    probe_round(&state).await;

    assert_eq!(link.probes.lock().unwrap().clone(), vec!["10.0.0.2".to_string()]);
    let front = test_helpers::record(&state, BoardName::FrontDoorEsp32).await;
    let camera = test_helpers::record(&state, BoardName::EntranceCamera).await;
    assert_eq!(front.state, LivenessState::Up);
    assert_eq!(camera.state, LivenessState::Down);
}

#[tokio::test]
async fn probe_round_flips_down_after_two_failed_rounds() {
    let link = Arc::new(MockLink::new());
    let state = state_with(PROBE, link.clone());
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();
    probe_round(&state).await;

    link.set_unreachable("10.0.0.5", true);
    probe_round(&state).await;
    assert_eq!(test_helpers::record(&state, BoardName::ProximityBoard).await.state, LivenessState::Up);

    probe_round(&state).await;
    let record = test_helpers::record(&state, BoardName::ProximityBoard).await;
    assert_eq!(record.state, LivenessState::Down);
    assert_eq!(record.address.as_deref(), Some("10.0.0.5"), "probe mode keeps the address");
}

/// Re-registers the proximity board while its probe is in flight, then fails.
struct ReRegisterDuringProbe {
    boards: Arc<RwLock<BoardTable>>,
}

#[async_trait::async_trait]
impl BoardLink for ReRegisterDuringProbe {
    async fn probe(&self, address: &str) -> Result<(), LinkError> {
        let mut boards = self.boards.write().await;
        boards.get_mut(&BoardName::ProximityBoard).unwrap().address = Some("10.0.0.99".into());
        Err(LinkError::Request { address: address.to_string(), reason: "unreachable".into() })
    }

    async fn send_command(&self, _address: &str, _command: AlarmCommand) -> Result<String, LinkError> {
        Ok(String::new())
    }
}

#[tokio::test]
async fn probe_result_for_replaced_address_is_discarded() {
    let strategy = LivenessStrategy::ActiveProbe { interval: Duration::from_secs(10), failure_threshold: 1 };
    let mut state = state_with(strategy, Arc::new(MockLink::new()));
    test_helpers::seed_up_board(&state, BoardName::ProximityBoard, "10.0.0.5").await;
    state.link = Arc::new(ReRegisterDuringProbe { boards: state.boards.clone() });

    probe_round(&state).await;

    let record = test_helpers::record(&state, BoardName::ProximityBoard).await;
    assert_eq!(record.address.as_deref(), Some("10.0.0.99"));
    assert_eq!(record.failed_probes, 0);
    assert_eq!(record.state, LivenessState::Up);
}

// =========================================================================
// PassiveHeartbeat
// =========================================================================

#[test]
fn heartbeat_within_window_keeps_board_up() {
    let start = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);
    assert_eq!(HEARTBEAT.on_contact(&mut record, start), Some(Transition::Recovered));
    assert_eq!(HEARTBEAT.expire(&mut record, start + Duration::from_secs(4)), None);
    assert_eq!(record.state, LivenessState::Up);
    assert!(record.address.is_some());
}

#[test]
fn stale_board_goes_down_and_loses_address() {
    let start = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);
    HEARTBEAT.on_contact(&mut record, start);

    assert_eq!(HEARTBEAT.expire(&mut record, start + Duration::from_secs(6)), Some(Transition::Lost));
    assert_eq!(record.state, LivenessState::Down);
    assert!(record.address.is_none());
    assert_eq!(HEARTBEAT.expire(&mut record, start + Duration::from_secs(60)), None);
}

#[test]
fn silent_registration_expires_from_registration_time() {
    let mut record = registered(BoardName::FrontDoorEsp32);
    let registered_at = record.registered_at.unwrap();
    assert_eq!(HEARTBEAT.expire(&mut record, registered_at + Duration::from_secs(3)), None);
    assert!(record.address.is_some());
    assert_eq!(HEARTBEAT.expire(&mut record, registered_at + Duration::from_secs(6)), None);
    assert!(record.address.is_none(), "address cleared even though the board was never up");
}

#[test]
fn reregistration_after_expiry_is_not_immediately_expired() {
    let start = Instant::now();
    let mut record = registered(BoardName::ProximityBoard);
    HEARTBEAT.on_contact(&mut record, start);
    HEARTBEAT.expire(&mut record, start + Duration::from_secs(10));

    let later = start + Duration::from_secs(20);
    record.address = Some("10.0.0.6".into());
    record.registered_at = Some(later);
    assert_eq!(HEARTBEAT.expire(&mut record, later + Duration::from_secs(1)), None);
    assert_eq!(record.address.as_deref(), Some("10.0.0.6"));
}

#[test]
fn contact_from_unregistered_board_does_not_mark_up() {
    let mut record = BoardRecord::new(BoardName::ProximityBoard);
    assert_eq!(HEARTBEAT.on_contact(&mut record, Instant::now()), None);
    assert_eq!(record.state, LivenessState::Down);
    assert!(record.last_contact.is_some());
}

#[test]
fn heartbeat_mode_ignores_probe_results() {
    let mut record = registered(BoardName::ProximityBoard);
    assert_eq!(HEARTBEAT.on_probe(&mut record, true, Instant::now()), None);
    assert_eq!(record.state, LivenessState::Down);
}

#[tokio::test]
async fn sweep_unregisters_stale_boards_in_state() {
    let state = state_with(HEARTBEAT, Arc::new(MockLink::new()));
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();
    assert_eq!(record_contact(&state, BoardName::ProximityBoard).await, Some(Transition::Recovered));

    sweep_at(&state, Instant::now() + Duration::from_secs(30)).await;

    assert_eq!(registry::lookup(&state, BoardName::ProximityBoard).await, None);
    let record = test_helpers::record(&state, BoardName::ProximityBoard).await;
    assert_eq!(record.state, LivenessState::Down);
}

#[tokio::test]
async fn late_heartbeat_expires_before_counting_as_contact() {
    let state = state_with(HEARTBEAT, Arc::new(MockLink::new()));
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();
    let start = Instant::now();
    record_contact_at(&state, BoardName::ProximityBoard, start).await;

    // Silent past the window, then calls in before any sweep ran.
    let late = start + Duration::from_secs(8);
    assert_eq!(record_contact_at(&state, BoardName::ProximityBoard, late).await, Some(Transition::Lost));

    let record = test_helpers::record(&state, BoardName::ProximityBoard).await;
    assert_eq!(record.address, None);
    assert_eq!(record.state, LivenessState::Down);
    assert_eq!(record.last_contact, Some(late));
}

#[tokio::test]
async fn timely_heartbeat_keeps_address() {
    let state = state_with(HEARTBEAT, Arc::new(MockLink::new()));
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();
    let start = Instant::now();
    record_contact_at(&state, BoardName::ProximityBoard, start).await;

    assert_eq!(record_contact_at(&state, BoardName::ProximityBoard, start + Duration::from_secs(4)).await, None);
    assert_eq!(registry::lookup(&state, BoardName::ProximityBoard).await.as_deref(), Some("10.0.0.5"));
}

#[test]
fn tick_follows_strategy() {
    assert_eq!(PROBE.tick(), Duration::from_secs(10));
    assert_eq!(HEARTBEAT.tick(), Duration::from_secs(5));
    let fast = LivenessStrategy::PassiveHeartbeat { stale_after: Duration::from_millis(10) };
    assert_eq!(fast.tick(), Duration::from_secs(1));
}

// =========================================================================
// Background task
// =========================================================================

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn liveness_task_probes_once_per_interval() {
    let link = Arc::new(MockLink::new());
    let state = state_with(PROBE, link.clone());
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();

    let task = spawn_liveness_task(state.clone());
    settle().await;
    assert_eq!(link.probes.lock().unwrap().len(), 1, "first round runs immediately");

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(link.probes.lock().unwrap().len(), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(link.probes.lock().unwrap().len(), 2);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(link.probes.lock().unwrap().len(), 3);
    let record = test_helpers::record(&state, BoardName::ProximityBoard).await;
    assert_eq!(record.state, LivenessState::Up);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn liveness_task_demotes_board_that_stops_answering() {
    let link = Arc::new(MockLink::new());
    let state = state_with(PROBE, link.clone());
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();

    let task = spawn_liveness_task(state.clone());
    settle().await;
    assert_eq!(test_helpers::record(&state, BoardName::ProximityBoard).await.state, LivenessState::Up);

    link.set_unreachable("10.0.0.5", true);
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(test_helpers::record(&state, BoardName::ProximityBoard).await.state, LivenessState::Up);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(test_helpers::record(&state, BoardName::ProximityBoard).await.state, LivenessState::Down);

    task.abort();
}
