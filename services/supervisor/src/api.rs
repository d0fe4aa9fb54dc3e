//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "HTTP control surface of the process supervisor."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcctl_common::supervisor::{ErrorBody, ProcessDescription, SignalRequest};
use serde::Serialize;
use tracing::warn;

use crate::table::{ProcessTable, TableError};

#[derive(Clone)]
struct AppState {
    table: Arc<ProcessTable>,
}

/// Basic health response payload.
#[derive(Serialize)]
struct Health {
    status: &'static str,
    processes: usize,
}

/// Build the control API over `table`.
pub fn router(table: Arc<ProcessTable>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/processes", get(list))
        .route("/api/processes/:name", get(describe))
        .route("/api/processes/:name/start", post(start))
        .route("/api/processes/:name/signal", post(signal))
        .route("/api/processes/:name/restart", post(restart))
        .with_state(AppState { table })
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        processes: state.table.len(),
    })
}

async fn list(State(state): State<AppState>) -> Json<Vec<ProcessDescription>> {
    Json(state.table.list())
}

async fn describe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProcessDescription>, ApiError> {
    Ok(Json(state.table.describe(&name)?))
}

async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProcessDescription>, ApiError> {
    Ok(Json(state.table.start(&name)?))
}

async fn signal(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<ProcessDescription>, ApiError> {
    Ok(Json(state.table.signal(&name, request.signal)?))
}

async fn restart(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProcessDescription>, ApiError> {
    Ok(Json(state.table.restart(&name).await?))
}

struct ApiError(TableError);

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TableError::UnknownProcess(_) => StatusCode::NOT_FOUND,
            TableError::Spawn { .. } | TableError::Signal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match std::error::Error::source(&self.0) {
            Some(source) => format!("{}: {source}", self.0),
            None => self.0.to_string(),
        };
        if status.is_server_error() {
            warn!(error = %message, "request failed");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
