//! Crate-wide error taxonomy (§7). One variant per documented error kind;
//! `IntoResponse` maps each to its HTTP status and the `{error, message?}` body.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no sources found")]
    NoSources,

    #[error("all candidate sources were exhausted")]
    AllSourcesExhausted,

    #[error("job exceeded its maximum duration")]
    JobDeadline,

    #[error("session already in use by {active_user} since {started_at_ms}")]
    SessionInUse {
        active_user: String,
        started_at_ms: i64,
    },

    #[error("session check did not complete within the deadline")]
    SessionTimeout,

    #[error("backing filesystem is unavailable")]
    FsUnavailable,

    #[error("no live-TV source is reachable for this channel")]
    BadStreamSources,

    #[error("job not found")]
    JobNotFound,

    #[error("channel not found")]
    ChannelNotFound,

    #[error("range not satisfiable")]
    RangeNotSatisfiable,

    #[error("path escapes the allowed mount root")]
    PathNotAllowed,

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoSources => StatusCode::NOT_FOUND,
            AppError::AllSourcesExhausted => StatusCode::BAD_GATEWAY,
            AppError::JobDeadline => StatusCode::GATEWAY_TIMEOUT,
            AppError::SessionInUse { .. } => StatusCode::CONFLICT,
            AppError::SessionTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::FsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadStreamSources => StatusCode::BAD_GATEWAY,
            AppError::JobNotFound | AppError::ChannelNotFound => StatusCode::NOT_FOUND,
            AppError::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            AppError::PathNotAllowed => StatusCode::FORBIDDEN,
            AppError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::NoSources => "NO_SOURCES",
            AppError::AllSourcesExhausted => "ALL_SOURCES_EXHAUSTED",
            AppError::JobDeadline => "JOB_DEADLINE",
            AppError::SessionInUse { .. } => "SESSION_IN_USE",
            AppError::SessionTimeout => "SESSION_TIMEOUT",
            AppError::FsUnavailable => "FS_UNAVAILABLE",
            AppError::BadStreamSources => "BAD_STREAM_SOURCES",
            AppError::JobNotFound => "JOB_NOT_FOUND",
            AppError::ChannelNotFound => "CHANNEL_NOT_FOUND",
            AppError::RangeNotSatisfiable => "RANGE_NOT_SATISFIABLE",
            AppError::PathNotAllowed => "PATH_NOT_ALLOWED",
            AppError::Collaborator(_) => "COLLABORATOR_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(rename = "activeUser", skip_serializing_if = "Option::is_none")]
    active_user: Option<String>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    started_at: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // The session-deny body follows the documented client contract
        // (§6: `in_use_elsewhere`), distinct from `kind()`'s internal label.
        let (error, active_user, started_at) = match &self {
            AppError::SessionInUse { active_user, started_at_ms } => {
                ("in_use_elsewhere", Some(active_user.clone()), Some(*started_at_ms))
            }
            _ => (self.kind(), None, None),
        };
        let body = ErrorBody {
            error,
            message: Some(self.to_string()),
            active_user,
            started_at,
        };
        (status, Json(body)).into_response()
    }
}

/// Error kinds internal to the job engine's candidate loop; these drive
/// local recovery and are folded into `Job::error_kind` rather than ever
/// reaching an HTTP handler directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFailure {
    SourceDead,
    SourceDmca,
    SourceTimeout,
    IncompatibleVideo,
    IncompatibleAudio,
    RemuxFailed,
}

impl CandidateFailure {
    pub fn as_reason(&self) -> &'static str {
        match self {
            CandidateFailure::SourceDead => "SOURCE_DEAD",
            CandidateFailure::SourceDmca => "SOURCE_DMCA",
            CandidateFailure::SourceTimeout => "SOURCE_TIMEOUT",
            CandidateFailure::IncompatibleVideo => "INCOMPATIBLE_VIDEO",
            CandidateFailure::IncompatibleAudio => "INCOMPATIBLE_AUDIO",
            CandidateFailure::RemuxFailed => "REMUX_FAILED",
        }
    }
}
