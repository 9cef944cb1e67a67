//! BackgroundEnrichers (§4.10): independent best-effort tasks that run after
//! a job becomes playable. Each writes through `JobRegistry::update` with
//! `from_orphan = false` — it started after completion, so it's allowed to
//! add data, but the terminal-state write guard still protects the
//! stream-bearing fields another task might try to overwrite concurrently.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::collaborators::enrichment::PrefetchMode;
use crate::collaborators::{MetadataProvider, SubtitleProvider};
use crate::job::engine::PostCompletionHook;
use crate::job::registry::JobRegistry;
use crate::model::{ContentRef, JobId, SubtitleAsset};

pub struct BackgroundEnrichers {
    registry: Arc<JobRegistry>,
    metadata: Arc<dyn MetadataProvider>,
    subtitles: Arc<dyn SubtitleProvider>,
}

impl BackgroundEnrichers {
    pub fn new(registry: Arc<JobRegistry>, metadata: Arc<dyn MetadataProvider>, subtitles: Arc<dyn SubtitleProvider>) -> Self {
        BackgroundEnrichers { registry, metadata, subtitles }
    }

    async fn run_next_episode(&self, job_id: JobId, content_ref: ContentRef) {
        match self.metadata.next_episode(&content_ref, PrefetchMode::Sequential).await {
            Ok(Some(hint)) => {
                self.registry.update(job_id, false, |j| j.next_episode = Some(hint));
            }
            Ok(None) => {}
            Err(err) => debug!(job_id = %job_id, %err, "next-episode lookup failed"),
        }
    }

    async fn run_skip_markers(&self, job_id: JobId, content_ref: ContentRef) {
        match self.metadata.skip_markers(&content_ref).await {
            Ok(Some(markers)) => {
                self.registry.update(job_id, false, |j| j.skip_markers = Some(markers));
            }
            Ok(None) => {}
            Err(err) => debug!(job_id = %job_id, %err, "skip-marker lookup failed"),
        }
    }

    /// Subtitle order (§4.10): cache → skip if an embedded clean English
    /// track already exists → external fetch+sync → fall back to the
    /// embedded English track index.
    async fn run_subtitles(&self, job_id: JobId, content_ref: ContentRef, has_english_subtitle: bool) {
        let Some(job) = self.registry.get(job_id) else { return };
        let Some(stream_url) = job.stream_url.clone() else { return };
        let video_hash = content_ref.content_key();

        if let Ok(Some(cached)) = self.subtitles.cached(&content_ref, "en", &video_hash).await {
            self.registry.update(job_id, false, |j| {
                j.subtitles.push(SubtitleAsset {
                    language: "en".to_string(),
                    url: cached,
                    auto_synced: true,
                });
            });
            return;
        }

        if has_english_subtitle {
            return;
        }

        match self.subtitles.fetch(&content_ref, "en").await {
            Ok(Some(path)) => match self.subtitles.sync(&stream_url, &path).await {
                Ok(synced) => {
                    self.registry.update(job_id, false, |j| {
                        j.subtitles.push(SubtitleAsset {
                            language: "en".to_string(),
                            url: synced,
                            auto_synced: true,
                        });
                    });
                }
                Err(err) => warn!(job_id = %job_id, %err, "subtitle sync failed, falling back to embedded track"),
            },
            Ok(None) | Err(_) => {
                if let Some(track) = job.embedded_subtitle_tracks.iter().find(|t| t.keep && t.language == "en") {
                    self.registry.update(job_id, false, |j| {
                        j.subtitles.push(SubtitleAsset {
                            language: "en".to_string(),
                            url: format!("embedded:{}", track.index),
                            auto_synced: false,
                        });
                    });
                }
            }
        }
    }
}

impl Clone for BackgroundEnrichers {
    fn clone(&self) -> Self {
        BackgroundEnrichers {
            registry: Arc::clone(&self.registry),
            metadata: Arc::clone(&self.metadata),
            subtitles: Arc::clone(&self.subtitles),
        }
    }
}

#[async_trait::async_trait]
impl PostCompletionHook for BackgroundEnrichers {
    async fn on_completed(&self, job_id: JobId, content_ref: ContentRef, has_english_subtitle: bool) {
        let a = self.clone();
        let cr = content_ref.clone();
        tokio::spawn(async move { a.run_next_episode(job_id, cr).await });

        let b = self.clone();
        let cr = content_ref.clone();
        tokio::spawn(async move { b.run_skip_markers(job_id, cr).await });

        let c = self.clone();
        tokio::spawn(async move { c.run_subtitles(job_id, content_ref, has_english_subtitle).await });
    }
}
