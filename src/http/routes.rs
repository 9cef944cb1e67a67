use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;
use super::{livetv, vod};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/vod/stream-url/start", post(vod::start))
        .route("/vod/stream-url/progress/{job_id}", get(vod::progress))
        .route("/vod/stream-url/cancel/{job_id}", delete(vod::cancel))
        .route("/vod/prefetch-next", post(vod::prefetch_next))
        .route("/vod/prefetch-promote/{job_id}", post(vod::prefetch_promote))
        .route("/vod/report-bad", post(vod::report_bad))
        .route("/vod/session/check", post(vod::session_check))
        .route("/vod/session/heartbeat", post(vod::session_heartbeat))
        .route("/vod/session/end", post(vod::session_end))
        .route("/vod/stream/{stream_id}", get(vod::stream_mount))
        .route("/vod/stream-processed/{job_id}", get(vod::stream_processed))
        .route("/livetv/stream/{channel_id}", get(livetv::stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
