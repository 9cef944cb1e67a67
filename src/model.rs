//! Core data model (§3).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Tv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformHint {
    Native,
    Web,
}

impl Default for PlatformHint {
    fn default() -> Self {
        PlatformHint::Native
    }
}

/// Immutable identity of the title being requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub external_id: String,
    pub kind: ContentKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub display_title: String,
    pub year: Option<u32>,
    pub platform_hint: PlatformHint,
}

impl ContentRef {
    /// Stable cache/dedup key: identity fields only, independent of display metadata.
    pub fn content_key(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => format!("{}:{}:s{}e{}", self.external_id, kind_tag(self.kind), s, e),
            _ => format!("{}:{}", self.external_id, kind_tag(self.kind)),
        }
    }
}

fn kind_tag(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Movie => "movie",
        ContentKind::Tv => "tv",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Zurg,
    Prowlarr,
}

/// One addressable copy of a title (§3 CandidateSource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSource {
    pub provenance: Provenance,
    pub stable_key: String,
    pub magnet_or_path: String,
    pub quality_label: String,
    pub resolution_height: Option<u32>,
    pub size_bytes: Option<u64>,
    pub cached_on_debrid: bool,
    pub over_bandwidth: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Searching,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubtitleTrack {
    pub index: u32,
    pub language: String,
    pub forced: bool,
    pub default: bool,
    pub sdh: bool,
    pub keep: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipMarkers {
    pub intro_start_ms: Option<u64>,
    pub intro_end_ms: Option<u64>,
    pub credits_start_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleAsset {
    pub language: String,
    pub url: String,
    pub auto_synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextEpisodeHint {
    pub content_ref: ContentRef,
}

/// The job record (§3 Job). Mutated only through `JobRegistry::update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub content_ref: ContentRef,
    pub user_ref: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub human_message: String,
    pub stream_url: Option<String>,
    pub file_name: Option<String>,
    pub quality: Option<String>,
    pub error_kind: Option<String>,
    pub processed_file_path: Option<String>,
    pub attempted_sources: Vec<String>,
    pub is_prefetch: bool,
    pub used_over_bandwidth_fallback: bool,
    pub embedded_subtitle_tracks: Vec<SubtitleTrack>,
    pub recommended_subtitle_index: Option<u32>,
    pub skip_markers: Option<SkipMarkers>,
    pub subtitles: Vec<SubtitleAsset>,
    pub next_episode: Option<NextEpisodeHint>,
}

impl Job {
    pub fn new(id: JobId, content_ref: ContentRef, user_ref: String, is_prefetch: bool) -> Self {
        Job {
            id,
            content_ref,
            user_ref,
            created_at: Utc::now(),
            status: JobStatus::Searching,
            progress_percent: 0,
            human_message: "searching for sources".to_string(),
            stream_url: None,
            file_name: None,
            quality: None,
            error_kind: None,
            processed_file_path: None,
            attempted_sources: Vec::new(),
            is_prefetch,
            used_over_bandwidth_fallback: false,
            embedded_subtitle_tracks: Vec::new(),
            recommended_subtitle_index: None,
            skip_markers: None,
            subtitles: Vec::new(),
            next_episode: None,
        }
    }

    /// True if `attempted_sources` already contains this stable key.
    pub fn has_attempted(&self, stable_key: &str) -> bool {
        self.attempted_sources.iter().any(|k| k == stable_key)
    }

    pub fn record_attempt(&mut self, stable_key: &str) {
        if !self.has_attempted(stable_key) {
            self.attempted_sources.push(stable_key.to_string());
        }
    }

    pub fn excluded_keys(&self) -> HashSet<String> {
        self.attempted_sources.iter().cloned().collect()
    }

    pub fn suggest_bandwidth_retest(&self, bandwidth_measured_at: Option<DateTime<Utc>>) -> bool {
        if self.used_over_bandwidth_fallback {
            return true;
        }
        match bandwidth_measured_at {
            Some(t) => Utc::now().signed_duration_since(t).num_seconds() > 3600,
            None => true,
        }
    }
}

/// Per-channel live-TV proxy state (§3 ChannelSourceState).
#[derive(Debug, Clone, Default)]
pub struct ChannelSourceState {
    pub active_index: usize,
    pub consecutive_fail_count: u32,
}

/// Concurrency arbiter session record (§3 DebridSession).
#[derive(Debug, Clone)]
pub struct DebridSession {
    pub debrid_key: String,
    pub ip_address: String,
    pub user_id: String,
    pub username: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Cached direct stream URL for a content key (§3 LinkCacheEntry).
#[derive(Debug, Clone)]
pub struct LinkCacheEntry {
    pub content_key: String,
    pub stream_url: String,
    pub file_name: String,
    pub resolution_height: Option<u32>,
    pub size_bytes: Option<u64>,
    pub inserted_at: DateTime<Utc>,
}
