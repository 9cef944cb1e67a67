//! Live-TV HTTP handlers (§6, §4.7): manifest and segment proxy sharing one
//! route, disambiguated by the presence of an `url` query parameter.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::AppError;
use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SegmentQuery {
    pub url: Option<String>,
}

pub async fn stream(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<SegmentQuery>,
) -> Result<Response, AppError> {
    match query.url {
        None => {
            let manifest = state.livetv.manifest(&channel_id).await?;
            let mut response = manifest.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/vnd.apple.mpegurl"));
            Ok(response)
        }
        Some(target) => {
            let segment = state.livetv.segment(&channel_id, &target).await?;
            let mut builder = Response::builder().status(StatusCode::OK);
            if let Some(content_type) = &segment.content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type.as_str());
            }
            if let Some(len) = segment.content_length {
                builder = builder.header(header::CONTENT_LENGTH, len.to_string());
            }
            builder
                .body(axum::body::Body::from(segment.body))
                .map_err(|_| AppError::BadStreamSources)
        }
    }
}
