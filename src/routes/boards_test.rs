use std::sync::Arc;

use serde_json::{Value, json};

use super::*;
use crate::config::HubConfig;
use crate::routes::test_server;
use crate::services::dispatch::Delivery;
use crate::services::link::mock::MockLink;
use crate::state::{AlarmCommand, BoardName, test_helpers};

async fn get_json(url: String) -> (reqwest::StatusCode, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

async fn post_json(url: String, body: Value) -> (reqwest::StatusCode, Value) {
    let resp = reqwest::Client::new().post(url).json(&body).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[test]
fn registry_error_to_status_maps_bad_request() {
    let err = registry::RegistryError::UnknownBoard("Doorbell".into());
    assert_eq!(registry_error_to_status(&err), StatusCode::BAD_REQUEST);
    assert_eq!(registry_error_to_status(&registry::RegistryError::EmptyAddress), StatusCode::BAD_REQUEST);
}

#[test]
fn pending_commands_use_board_wire_names() {
    assert_eq!(wire_command(PendingCommand::None), "no_command");
    assert_eq!(wire_command(PendingCommand::Activate), "activate_alarm");
    assert_eq!(wire_command(PendingCommand::Deactivate), "deactivate_alarm");
}

#[tokio::test]
async fn register_accepts_ip_or_address_and_rejects_unknown_names() {
    let state = test_helpers::test_app_state();
    let base = test_server::spawn_hub(state.clone()).await;

    let (status, body) =
        post_json(format!("{base}/register"), json!({ "name": "ProximityBoard", "ip": "10.0.0.5" })).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "ProximityBoard registered with IP 10.0.0.5");

    let (status, _) =
        post_json(format!("{base}/register"), json!({ "name": "EntranceCamera", "address": "10.0.0.9" })).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let (status, body) = post_json(format!("{base}/register"), json!({ "name": "Doorbell", "ip": "10.0.0.7" })).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");

    assert_eq!(registry::lookup(&state, BoardName::ProximityBoard).await.as_deref(), Some("10.0.0.5"));
    assert_eq!(registry::lookup(&state, BoardName::EntranceCamera).await.as_deref(), Some("10.0.0.9"));
}

#[tokio::test]
async fn heartbeat_marks_registered_board_up() {
    let state = test_helpers::test_app_state();
    registry::register(&state, "ProximityBoard", "10.0.0.5").await.unwrap();
    let base = test_server::spawn_hub(state).await;

    let (status, body) = get_json(format!("{base}/heartbeat?name=ProximityBoard")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["state"], "up");
    assert_eq!(body["registered"], true);
    assert_eq!(body["command"], "no_command");
}

#[tokio::test]
async fn unregistered_board_is_told_to_register() {
    let base = test_server::spawn_hub(test_helpers::test_app_state()).await;

    let (status, body) = post_json(format!("{base}/status"), json!({ "name": "FrontDoorESP32" })).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["state"], "down");
    assert_eq!(body["registered"], false);
}

#[tokio::test]
async fn camera_heartbeat_carries_no_command() {
    let base = test_server::spawn_hub(test_helpers::test_app_state()).await;
    let (_, body) = get_json(format!("{base}/status?name=EntranceCamera")).await;
    assert!(body.get("command").is_none());
}

#[tokio::test]
async fn heartbeat_from_unknown_board_is_rejected() {
    let base = test_server::spawn_hub(test_helpers::test_app_state()).await;
    let (status, body) = get_json(format!("{base}/heartbeat?name=Doorbell")).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");
}

#[tokio::test]
async fn pull_heartbeat_hands_out_latched_command_once() {
    let config = HubConfig { delivery: Delivery::Pull, ..HubConfig::default() };
    let state = test_helpers::test_app_state_with(config, Arc::new(MockLink::new()));
    registry::register(&state, "FrontDoorESP32", "10.0.0.2").await.unwrap();
    dispatch::deliver(&state, BoardName::FrontDoorEsp32, AlarmCommand::Activate).await.unwrap();
    let base = test_server::spawn_hub(state).await;

    let (_, first) = post_json(format!("{base}/heartbeat"), json!({ "name": "FrontDoorESP32" })).await;
    let (_, second) = post_json(format!("{base}/heartbeat"), json!({ "name": "FrontDoorESP32" })).await;

    assert_eq!(first["command"], "activate_alarm");
    assert_eq!(second["command"], "no_command");
}

#[tokio::test]
async fn board_statuses_lists_every_board_in_fixed_order() {
    let state = test_helpers::test_app_state();
    test_helpers::seed_up_board(&state, BoardName::FrontDoorEsp32, "10.0.0.2").await;
    let base = test_server::spawn_hub(state).await;

    let (status, body) = get_json(format!("{base}/board_statuses")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let names: Vec<&str> = body.as_array().unwrap().iter().map(|b| b["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["EntranceCamera", "FrontDoorESP32", "ProximityBoard"]);
    assert_eq!(body[1]["state"], "up");
    assert_eq!(body[1]["address"], "10.0.0.2");
    assert_eq!(body[0]["alarm_capable"], false);
    assert_eq!(body[2]["state"], "down");
}

#[tokio::test]
async fn proximity_board_scenario_over_http() {
    let state = test_helpers::test_app_state();
    let base = test_server::spawn_hub(state).await;

    post_json(format!("{base}/register"), json!({ "name": "ProximityBoard", "ip": "10.0.0.5" })).await;
    let (status, _) = post_json(format!("{base}/movement_event"), json!({ "distance": 42 })).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let (_, queue) = get_json(format!("{base}/notifications")).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["type"], "movement_event");
    assert!(queue[0]["message"].as_str().unwrap().contains("42"));

    let (_, boards) = get_json(format!("{base}/board_statuses")).await;
    assert_eq!(boards[2]["state"], "down");

    get_json(format!("{base}/heartbeat?name=ProximityBoard")).await;
    let (_, boards) = get_json(format!("{base}/board_statuses")).await;
    assert_eq!(boards[2]["state"], "up");
}

#[test]
fn pending_commands_map_to_poll_status_codes() {
    assert_eq!(pending_status(PendingCommand::None), StatusCode::ACCEPTED);
    assert_eq!(pending_status(PendingCommand::Activate), StatusCode::NON_AUTHORITATIVE_INFORMATION);
    assert_eq!(pending_status(PendingCommand::Deactivate), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn door_controller_poll_reads_command_from_status_code() {
    let config = HubConfig { delivery: Delivery::Pull, ..HubConfig::default() };
    let state = test_helpers::test_app_state_with(config, Arc::new(MockLink::new()));
    registry::register(&state, "FrontDoorESP32", "10.0.0.2").await.unwrap();
    dispatch::deliver(&state, BoardName::FrontDoorEsp32, AlarmCommand::Activate).await.unwrap();
    let base = test_server::spawn_hub(state.clone()).await;
    let client = reqwest::Client::new();
    let poll = || {
        client
            .post(format!("{base}/send_status"))
            .json(&json!({ "message": "Board is up", "name": "FrontDoorESP32" }))
            .send()
    };

    assert_eq!(poll().await.unwrap().status(), reqwest::StatusCode::NON_AUTHORITATIVE_INFORMATION);
    assert_eq!(poll().await.unwrap().status(), reqwest::StatusCode::ACCEPTED);

    dispatch::deliver(&state, BoardName::FrontDoorEsp32, AlarmCommand::Deactivate).await.unwrap();
    assert_eq!(poll().await.unwrap().status(), reqwest::StatusCode::NO_CONTENT);

    let record = test_helpers::record(&state, BoardName::FrontDoorEsp32).await;
    assert_eq!(record.state, LivenessState::Up);
    assert_eq!(record.last_command, Some(AlarmCommand::Deactivate));
}

#[tokio::test]
async fn door_controller_poll_from_unknown_board_is_rejected() {
    let base = test_server::spawn_hub(test_helpers::test_app_state()).await;
    let (status, body) =
        post_json(format!("{base}/send_status"), json!({ "message": "Board is up", "name": "Doorbell" })).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");
}
