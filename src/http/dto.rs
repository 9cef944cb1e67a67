//! Request/response shapes for the VOD + live-TV HTTP surface (§6). Field
//! names are camelCase on the wire to match the documented client contract.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::enrichment::PrefetchMode;
use crate::model::{ContentKind, Job, JobStatus, NextEpisodeHint, PlatformHint, SkipMarkers, SubtitleAsset, SubtitleTrack};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub user_id: String,
    pub external_id: String,
    pub kind: ContentKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    #[serde(default)]
    pub platform: Option<PlatformHint>,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub immediate: bool,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    pub subtitles: Vec<SubtitleAsset>,
    pub embedded_subtitle_tracks: Vec<SubtitleTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_subtitle_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_markers: Option<SkipMarkers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub suggest_bandwidth_retest: bool,
    pub has_next_episode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_episode: Option<NextEpisodeHint>,
}

impl ProgressResponse {
    pub fn from_job(job: &Job, suggest_bandwidth_retest: bool) -> Self {
        let status = match job.status {
            JobStatus::Searching => "searching",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        ProgressResponse {
            status,
            progress: job.progress_percent,
            message: job.human_message.clone(),
            stream_url: job.stream_url.clone(),
            file_name: job.file_name.clone(),
            quality: job.quality.clone(),
            subtitles: job.subtitles.clone(),
            embedded_subtitle_tracks: job.embedded_subtitle_tracks.clone(),
            recommended_subtitle_index: job.recommended_subtitle_index,
            skip_markers: job.skip_markers.clone(),
            error: job.error_kind.clone(),
            suggest_bandwidth_retest,
            has_next_episode: job.next_episode.is_some(),
            next_episode: job.next_episode.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchNextRequest {
    pub user_id: String,
    pub external_id: String,
    pub kind: ContentKind,
    pub current_season: Option<u32>,
    pub current_episode: Option<u32>,
    pub mode: PrefetchModeDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchModeDto {
    Sequential,
    Random,
}

impl From<PrefetchModeDto> for PrefetchMode {
    fn from(value: PrefetchModeDto) -> Self {
        match value {
            PrefetchModeDto::Sequential => PrefetchMode::Sequential,
            PrefetchModeDto::Random => PrefetchMode::Random,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchNextResponse {
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBadRequest {
    pub user_id: String,
    pub job_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBadResponse {
    pub new_job_id: Uuid,
    pub reported_count: usize,
    pub excluded_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub user_id: String,
    pub username: String,
    pub ip_address: String,
}

#[derive(Debug, Serialize)]
pub struct SessionCheckResponse {
    pub success: bool,
}
