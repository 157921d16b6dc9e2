// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP facade over the volume service
//!
//! | Route | Success | Errors |
//! |-------|---------|--------|
//! | `POST /volume?name=<name>` | `201 {"Name","Path"}` | 400 bad name/body, 409 exists, 500 |
//! | `GET /volume/{name}` | `200 {"Name","Path"}` | 400 bad name, 404 absent, 500 |
//! | `DELETE /volume/{name}` | `200` empty | 400 bad name, 500 |
//! | `GET /health` | `200 {"status","uptime_seconds"}` | |
//!
//! Error bodies are plain text.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::volume_manager::{CreateOutcome, VolumeManagerError, VolumeService};
use crate::domain::volume::Volume;

pub struct AppState {
    pub volume_service: Arc<dyn VolumeService>,
    pub start_time: Instant,
}

pub fn app(service: Arc<dyn VolumeService>) -> Router {
    let state = Arc::new(AppState {
        volume_service: service,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/volume", post(create_volume_handler))
        .route("/volume/", get(missing_name_handler).delete(missing_name_handler))
        .route(
            "/volume/{name}",
            get(get_volume_handler).delete(delete_volume_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateVolumeParams {
    pub name: Option<String>,
}

/// Create request body. Field names are accepted capitalized or lowercase.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CreateVolumeRequest {
    #[serde(rename = "Hosts", alias = "hosts", default)]
    pub hosts: Option<Vec<String>>,
    #[serde(rename = "Options", alias = "options", default)]
    pub options: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VolumeResponse {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Path")]
    pub path: String,
}

impl From<&Volume> for VolumeResponse {
    fn from(volume: &Volume) -> Self {
        Self {
            name: volume.name.to_string(),
            path: volume.path().display().to_string(),
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn create_volume_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateVolumeParams>,
    body: Bytes,
) -> Response {
    let Some(name) = params.name.filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "must supply a name parameter").into_response();
    };

    let request: CreateVolumeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("error decoding request: {}", e))
                .into_response();
        }
    };

    let hosts = request.hosts.unwrap_or_default();
    let options = request.options.unwrap_or_default();

    match state.volume_service.create_volume(&name, hosts, options).await {
        Ok(CreateOutcome::Created(volume)) => {
            (StatusCode::CREATED, Json(VolumeResponse::from(&volume))).into_response()
        }
        Ok(CreateOutcome::AlreadyExists) => {
            (StatusCode::CONFLICT, "already exists").into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_volume_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.volume_service.get_volume(&name).await {
        Ok(Some(volume)) => Json(VolumeResponse::from(&volume)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "volume not found").into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_volume_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.volume_service.delete_volume(&name).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e),
    }
}

async fn missing_name_handler() -> Response {
    (StatusCode::BAD_REQUEST, "must provide name parameter").into_response()
}

fn error_response(err: VolumeManagerError) -> Response {
    if err.is_client_error() {
        warn!(error = %err, "rejected volume request");
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }
    error!(error = %err, "volume request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}
