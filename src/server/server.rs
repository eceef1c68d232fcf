use super::metrics;
use super::state::{GuardedViewTracker, OptionalFlushHandle, ServerState};
use super::log_requests;
use crate::background_jobs::FlushTriggerError;
use crate::view_cache::CacheError;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
}

#[derive(Deserialize)]
struct PostIdsBody {
    pub post_ids: Vec<i64>,
}

#[derive(Serialize)]
struct PostIdsResponse {
    pub post_ids: Vec<i64>,
}

#[derive(Serialize)]
struct HasViewedResponse {
    pub viewed: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn cache_error_response(e: CacheError) -> Response {
    error!("View cache error: {}", e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
    };
    Json(stats)
}

async fn mark_viewed(
    State(tracker): State<GuardedViewTracker>,
    Path(user_id): Path<i64>,
    Json(body): Json<PostIdsBody>,
) -> Response {
    match tracker.mark_viewed(user_id, &body.post_ids).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => cache_error_response(e),
    }
}

async fn get_viewed_posts(
    State(tracker): State<GuardedViewTracker>,
    Path(user_id): Path<i64>,
) -> Response {
    match tracker.get_viewed_posts(user_id).await {
        Ok(viewed) => {
            let mut post_ids: Vec<i64> = viewed.into_iter().collect();
            post_ids.sort_unstable();
            Json(PostIdsResponse { post_ids }).into_response()
        }
        Err(e) => cache_error_response(e),
    }
}

async fn has_viewed(
    State(tracker): State<GuardedViewTracker>,
    Path((user_id, post_id)): Path<(i64, i64)>,
) -> Response {
    match tracker.has_viewed(user_id, post_id).await {
        Ok(viewed) => Json(HasViewedResponse { viewed }).into_response(),
        Err(e) => cache_error_response(e),
    }
}

async fn filter_unviewed(
    State(tracker): State<GuardedViewTracker>,
    Path(user_id): Path<i64>,
    Json(body): Json<PostIdsBody>,
) -> Response {
    match tracker.filter_unviewed(user_id, &body.post_ids).await {
        Ok(post_ids) => Json(PostIdsResponse { post_ids }).into_response(),
        Err(e) => cache_error_response(e),
    }
}

async fn get_flush_status(State(flush_handle): State<OptionalFlushHandle>) -> Response {
    let Some(handle) = flush_handle else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match handle.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => cache_error_response(e),
    }
}

async fn trigger_flush(State(flush_handle): State<OptionalFlushHandle>) -> Response {
    let Some(handle) = flush_handle else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match handle.flush_now().await {
        Ok(run) => Json(run).into_response(),
        Err(e @ FlushTriggerError::FlushFailed(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let view_routes: Router = Router::new()
        .route("/{user_id}/views", get(get_viewed_posts).post(mark_viewed))
        .route("/{user_id}/views/{post_id}", get(has_viewed))
        .route("/{user_id}/unviewed", post(filter_unviewed))
        .with_state(state.clone());

    let admin_routes: Router = Router::new()
        .route("/flush", get(get_flush_status).post(trigger_flush))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/v1/users", view_routes)
        .nest("/v1/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serves the API and the metrics endpoint until `shutdown_token` is cancelled.
pub async fn run_server(state: ServerState, shutdown_token: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let api_shutdown = shutdown_token.clone().cancelled_owned();
    let metrics_shutdown = shutdown_token.cancelled_owned();
    tokio::try_join!(
        async {
            axum::serve(listener, app)
                .with_graceful_shutdown(api_shutdown)
                .await
                .context("HTTP server failed")
        },
        async {
            axum::serve(metrics_listener, make_metrics_app())
                .with_graceful_shutdown(metrics_shutdown)
                .await
                .context("Metrics server failed")
        },
    )?;
    Ok(())
}
