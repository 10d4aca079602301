mod config;
mod frame;
mod routes;
mod services;
mod state;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::HubConfig::from_env().expect("invalid hub configuration");
    let port = config.port;

    let link = services::link::HttpBoardLink::new(config.board_timeouts).expect("board http client build failed");
    let camera_http = reqwest::Client::builder()
        .connect_timeout(config.board_timeouts.connect())
        .build()
        .expect("camera http client build failed");

    tracing::info!(
        liveness = ?config.liveness,
        delivery = ?config.delivery,
        images_dir = %config.images_dir.display(),
        "hub configured"
    );

    let state = state::AppState::new(config, Arc::new(link), camera_http);

    // Probe or staleness sweeps run for the lifetime of the process.
    let _liveness = services::liveness::spawn_liveness_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sentinel hub listening");
    axum::serve(listener, app).await.expect("server failed");
}
