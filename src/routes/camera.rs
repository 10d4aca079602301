//! Camera pass-through: live video proxy and still capture.
//!
//! DESIGN
//! ======
//! The camera board serves an MJPEG stream the dashboard cannot reach
//! directly, so the hub relays it chunk by chunk without buffering. Stills
//! are fetched whole and written under the configured images directory.
//! These calls use the plain HTTP client: a video stream outlives any
//! request timeout that would suit an alarm command.

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::routes::alarms::{PasswordBody, dispatch_error_to_status};
use crate::routes::{failure, success};
use crate::services::link::board_url;
use crate::services::{dispatch, registry};
use crate::state::{AppState, BoardName};

const NOT_REGISTERED: &str = "EntranceCamera not registered";

/// `GET /live_video`: relay the camera's stream.
pub async fn live_video(State(state): State<AppState>) -> Response {
    let Some(address) = registry::lookup(&state, BoardName::EntranceCamera).await else {
        return failure(StatusCode::BAD_REQUEST, NOT_REGISTERED);
    };

    let upstream = match state.http.get(board_url(&address, "/live_video")).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            warn!(%address, status = resp.status().as_u16(), "camera refused live video");
            return failure(StatusCode::BAD_GATEWAY, "Failed to fetch live video from camera");
        }
        Err(e) => {
            warn!(%address, error = %e, "camera unreachable for live video");
            return failure(StatusCode::BAD_GATEWAY, "Failed to fetch live video from camera");
        }
    };

    info!(%address, "relaying live video");
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let content_length = upstream.headers().get(header::CONTENT_LENGTH).cloned();
    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    if let Some(value) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = content_length {
        response.headers_mut().insert(header::CONTENT_LENGTH, value);
    }
    response
}

/// `POST /capture_image {password}`: fetch one still and save it.
pub async fn capture_image(State(state): State<AppState>, Json(body): Json<PasswordBody>) -> Response {
    if let Err(e) = dispatch::authorize(&state, &body.password) {
        return failure(dispatch_error_to_status(&e), e.to_string());
    }
    let Some(address) = registry::lookup(&state, BoardName::EntranceCamera).await else {
        return failure(StatusCode::BAD_REQUEST, NOT_REGISTERED);
    };

    let bytes = match fetch_still(&state, &address).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%address, error = %e, "image capture failed");
            return failure(StatusCode::BAD_GATEWAY, "Failed to capture image from camera");
        }
    };

    let file_name = image_file_name(OffsetDateTime::now_utc());
    let dir = &state.config.images_dir;
    let path = dir.join(&file_name);
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &bytes).await
    };
    if let Err(e) = written.await {
        warn!(path = %path.display(), error = %e, "image write failed");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save captured image");
    }

    info!(path = %path.display(), bytes = bytes.len(), "image captured");
    success(format!("Image captured and saved as {file_name}"))
}

async fn fetch_still(state: &AppState, address: &str) -> Result<axum::body::Bytes, reqwest::Error> {
    state
        .http
        .get(board_url(address, "/capture"))
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await
}

pub(crate) fn image_file_name(at: OffsetDateTime) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("image_{millis}.jpg")
}

#[cfg(test)]
#[path = "camera_test.rs"]
mod tests;
