//! VOD HTTP handlers (§6): job start/progress/cancel, prefetch, bad-link
//! reporting, session arbitration, and the two byte-range proxy endpoints.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::dto::*;
use crate::http::state::AppState;
use crate::job::engine::{StartOptions, UserCtx};
use crate::model::ContentRef;
use crate::rangeproxy::{parse_single_range, RangeProxy};
use crate::session::CheckOutcome;

pub async fn start(State(state): State<AppState>, Json(req): Json<StartRequest>) -> Result<Json<StartResponse>, AppError> {
    let profile = state
        .users
        .profile(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;

    let platform = req.platform.unwrap_or_default();
    let content_ref = ContentRef {
        external_id: req.external_id,
        kind: req.kind,
        season: req.season,
        episode: req.episode,
        display_title: req.display_title.unwrap_or_default(),
        year: req.year,
        platform_hint: platform,
    };
    let user_ctx = UserCtx {
        user_id: req.user_id,
        platform,
        bandwidth_ceiling_mbps: profile.bandwidth_mbps,
    };

    let job_id = state.engine.start(content_ref, user_ctx, StartOptions::default());
    Ok(Json(StartResponse { immediate: false, job_id }))
}

pub async fn progress(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<ProgressResponse>, AppError> {
    let job = state.engine.progress(job_id).ok_or(AppError::JobNotFound)?;
    let suggest_retest = match state.users.profile(&job.user_ref).await {
        Ok(profile) => job.suggest_bandwidth_retest(profile.bandwidth_measured_at),
        Err(_) => true,
    };
    Ok(Json(ProgressResponse::from_job(&job, suggest_retest)))
}

pub async fn cancel(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> StatusCode {
    state.engine.cancel(job_id);
    StatusCode::NO_CONTENT
}

pub async fn prefetch_next(
    State(state): State<AppState>,
    Json(req): Json<PrefetchNextRequest>,
) -> Result<Json<PrefetchNextResponse>, AppError> {
    let profile = state
        .users
        .profile(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    let current = ContentRef {
        external_id: req.external_id,
        kind: req.kind,
        season: req.current_season,
        episode: req.current_episode,
        display_title: String::new(),
        year: None,
        platform_hint: Default::default(),
    };
    let user_ctx = UserCtx {
        user_id: req.user_id,
        platform: Default::default(),
        bandwidth_ceiling_mbps: profile.bandwidth_mbps,
    };
    let job_id = state
        .prefetcher
        .prefetch_next(&current, user_ctx, req.mode.into())
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    Ok(Json(PrefetchNextResponse {
        has_next: job_id.is_some(),
        job_id,
    }))
}

pub async fn prefetch_promote(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<ProgressResponse>, AppError> {
    let job = state.prefetcher.promote(job_id).await.ok_or(AppError::JobNotFound)?;
    let suggest_retest = match state.users.profile(&job.user_ref).await {
        Ok(profile) => job.suggest_bandwidth_retest(profile.bandwidth_measured_at),
        Err(_) => true,
    };
    Ok(Json(ProgressResponse::from_job(&job, suggest_retest)))
}

pub async fn report_bad(
    State(state): State<AppState>,
    Json(req): Json<ReportBadRequest>,
) -> Result<Json<ReportBadResponse>, AppError> {
    let job = state.engine.progress(req.job_id).ok_or(AppError::JobNotFound)?;
    let profile = state
        .users
        .profile(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    let excluded_count = job.attempted_sources.len();
    let user_ctx = UserCtx {
        user_id: req.user_id,
        platform: job.content_ref.platform_hint,
        bandwidth_ceiling_mbps: profile.bandwidth_mbps,
    };
    let new_job_id = state.engine.report_bad(req.job_id, user_ctx).ok_or(AppError::JobNotFound)?;
    Ok(Json(ReportBadResponse {
        new_job_id,
        reported_count: excluded_count,
        excluded_count,
    }))
}

pub async fn session_check(State(state): State<AppState>, Json(req): Json<SessionRequest>) -> Result<Json<SessionCheckResponse>, AppError> {
    let debrid_key = state
        .users
        .arbitration_key(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    match state.sessions.check(&debrid_key, &req.ip_address, &req.user_id, &req.username).await? {
        CheckOutcome::Admitted => Ok(Json(SessionCheckResponse { success: true })),
        CheckOutcome::Denied { active_user, started_at_ms } => Err(AppError::SessionInUse { active_user, started_at_ms }),
    }
}

pub async fn session_heartbeat(State(state): State<AppState>, Json(req): Json<SessionRequest>) -> Result<StatusCode, AppError> {
    let debrid_key = state
        .users
        .arbitration_key(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    state.sessions.heartbeat(&debrid_key, &req.ip_address);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_end(State(state): State<AppState>, Json(req): Json<SessionRequest>) -> Result<StatusCode, AppError> {
    let debrid_key = state
        .users
        .arbitration_key(&req.user_id)
        .await
        .map_err(|e| AppError::Collaborator(e.to_string()))?;
    state.sessions.end(&debrid_key, &req.ip_address);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stream_mount(State(state): State<AppState>, Path(stream_id): Path<String>, headers: HeaderMap) -> Result<Response, AppError> {
    let path = state.rangeproxy.resolve_path(&stream_id)?;
    serve_range(&state.rangeproxy, &path, &headers).await
}

pub async fn stream_processed(State(state): State<AppState>, Path(job_id): Path<Uuid>, headers: HeaderMap) -> Result<Response, AppError> {
    let job = state.engine.progress(job_id).ok_or(AppError::JobNotFound)?;
    let path_str = job.processed_file_path.ok_or(AppError::JobNotFound)?;
    serve_range(&state.rangeproxy, FsPath::new(&path_str), &headers).await
}

async fn serve_range(proxy: &RangeProxy, path: &FsPath, headers: &HeaderMap) -> Result<Response, AppError> {
    let total_len = proxy.stat(path).await?;
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let range = match range_header {
        Some(h) => Some(parse_single_range(h, total_len).ok_or(AppError::RangeNotSatisfiable)?),
        None => None,
    };

    let (byte_range, total_len, file) = proxy.open_range(path, range).await?;
    let body = Body::from_stream(ReaderStream::new(file));
    let status = if range.is_some() { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK };

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_LENGTH, (byte_range.end - byte_range.start + 1).to_string())
        .header(header::ACCEPT_RANGES, "bytes");
    if range.is_some() {
        response = response.header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", byte_range.start, byte_range.end, total_len));
    }
    response.body(body).map_err(|_| AppError::FsUnavailable).map(IntoResponse::into_response)
}
