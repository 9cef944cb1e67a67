//! Container/stream introspection and remux execution collaborators (§4.5).

use async_trait::async_trait;

use crate::model::SubtitleTrack;

#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    pub index: u32,
    pub codec: String,
    pub language: String,
    pub channels: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct SubtitleStreamInfo {
    pub index: u32,
    pub language: String,
    pub forced: bool,
    pub default: bool,
    pub sdh: bool,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub video_codec: String,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub subtitle_streams: Vec<SubtitleStreamInfo>,
    pub has_chapters: bool,
    pub duration_secs: f64,
    pub probe_time_ms: u64,
    pub timed_out: bool,
    pub container_is_matroska_like: bool,
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> anyhow::Result<ProbeResult>;
}

/// What `Validator` asks the `Remuxer` to do.
#[derive(Debug, Clone)]
pub struct RemuxPlan {
    pub stream_copy_to_mp4: bool,
    pub tag_hvc1: bool,
    pub audio_action: AudioAction,
    pub clean_subtitles: bool,
    pub kept_subtitle_tracks: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone)]
pub enum AudioAction {
    None,
    RemuxToStream { source_index: u32 },
    TranscodeTo { target_codec: String },
}

#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Executes the plan against the source URL, producing a local file.
    /// Returns the produced file path on success.
    async fn execute(&self, source_url: &str, plan: &RemuxPlan) -> anyhow::Result<String>;
}

pub struct FakeProber {
    pub result: ProbeResult,
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _url: &str) -> anyhow::Result<ProbeResult> {
        Ok(self.result.clone())
    }
}

pub struct FakeRemuxer {
    pub output_path: String,
    pub should_fail: bool,
}

#[async_trait]
impl Remuxer for FakeRemuxer {
    async fn execute(&self, _source_url: &str, _plan: &RemuxPlan) -> anyhow::Result<String> {
        if self.should_fail {
            anyhow::bail!("remux failed");
        }
        Ok(self.output_path.clone())
    }
}
