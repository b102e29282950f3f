// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer HTTP Handlers 🕸️
//!
//! The relayer serves its metrics over HTTP, under `/api/v1`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use appchain_relayer_context::RelayerContext;

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

/// The body of the metrics endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerMetricResponse {
    /// Every relayer metric in the prometheus text format.
    pub metrics: String,
}

/// Handles relayer metric requests
///
/// Returns a Result with the `RelayerMetricResponse` on success
pub async fn handle_metric_info(
    State(ctx): State<Arc<RelayerContext>>,
) -> Result<Json<RelayerMetricResponse>, HandlerError> {
    let metrics = ctx.metrics.lock().await.gather_metrics().map_err(|e| {
        HandlerError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(RelayerMetricResponse { metrics }))
}

/// The routes of the relayer.
pub fn router(ctx: RelayerContext) -> Router {
    let api = Router::new()
        .route("/metrics", get(handle_metric_info))
        .with_state(Arc::new(ctx));
    Router::new().nest("/api/v1", api)
}

/// Serves the relayer routes on the configured port until the shutdown signal.
pub async fn build_web_services(ctx: RelayerContext) -> anyhow::Result<()> {
    let mut shutdown_signal = ctx.shutdown_signal();
    let socket_addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    tracing::info!("Starting the web server on {}", socket_addr);
    axum::Server::try_bind(&socket_addr)?
        .serve(router(ctx).into_make_service())
        .with_graceful_shutdown(async move { shutdown_signal.recv().await })
        .await?;
    Ok(())
}
