//! Prefetcher (§4.9): speculative job creation for autoplay, with
//! deduplication against already-running prefetch jobs for the same user.

use std::sync::Arc;

use crate::collaborators::enrichment::PrefetchMode;
use crate::collaborators::MetadataProvider;
use crate::job::registry::JobRegistry;
use crate::job::engine::{JobEngine, StartOptions, UserCtx};
use crate::model::{ContentRef, Job, JobId, JobStatus};
use crate::resolver::Excluded;

pub struct Prefetcher {
    engine: Arc<JobEngine>,
    registry: Arc<JobRegistry>,
    metadata: Arc<dyn MetadataProvider>,
}

impl Prefetcher {
    pub fn new(engine: Arc<JobEngine>, registry: Arc<JobRegistry>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Prefetcher { engine, registry, metadata }
    }

    /// Derives the next `ContentRef` and either returns an existing
    /// in-flight prefetch job for it or starts a new one.
    pub async fn prefetch_next(
        &self,
        current: &ContentRef,
        user_ctx: UserCtx,
        mode: PrefetchMode,
    ) -> anyhow::Result<Option<JobId>> {
        let Some(hint) = self.metadata.next_episode(current, mode).await? else {
            return Ok(None);
        };

        if let Some(existing) = self.find_existing_prefetch(&user_ctx.user_id, &hint.content_ref) {
            return Ok(Some(existing.id));
        }

        let id = self.engine.start(
            hint.content_ref,
            user_ctx,
            StartOptions {
                prefetch: true,
                excluded: Excluded::default(),
            },
        );
        Ok(Some(id))
    }

    fn find_existing_prefetch(&self, user_id: &str, content_ref: &ContentRef) -> Option<Job> {
        self.registry.get_all_active().into_iter().find(|job| {
            job.is_prefetch
                && job.user_ref == user_id
                && job.content_ref.content_key() == content_ref.content_key()
                && matches!(job.status, JobStatus::Searching | JobStatus::Downloading | JobStatus::Completed)
        })
    }

    /// Clears the prefetch flag so the job is treated as the user's active
    /// selection, then re-derives a fresh next-episode hint to chain autoplay.
    pub async fn promote(&self, job_id: JobId) -> Option<Job> {
        let job = self.engine.promote(job_id)?;
        if let Ok(Some(hint)) = self.metadata.next_episode(&job.content_ref, PrefetchMode::Sequential).await {
            self.registry.update(job_id, false, |j| j.next_episode = Some(hint));
        }
        self.registry.get(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LinkCache, ReqwestLivenessProbe};
    use crate::collaborators::debrid::FakeDebridClient;
    use crate::collaborators::media::{FakeProber, FakeRemuxer, ProbeResult};
    use crate::collaborators::{FakeIndexer, FakeMetadataProvider, FakeZurg};
    use crate::config::{TimeoutsConfig, ValidatorConfig};
    use crate::job::engine::NoopHook;
    use crate::model::{CandidateSource, ContentKind, NextEpisodeHint, PlatformHint, Provenance};
    use crate::resolver::SourceResolver;
    use crate::validator::Validator;
    use std::collections::HashMap;
    use std::time::Duration;

    fn content_ref(ep: u32) -> ContentRef {
        ContentRef {
            external_id: "1399".to_string(),
            kind: ContentKind::Tv,
            season: Some(1),
            episode: Some(ep),
            display_title: "Game of Thrones".to_string(),
            year: Some(2011),
            platform_hint: PlatformHint::Native,
        }
    }

    fn build() -> (Prefetcher, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new(256, Duration::from_secs(30)));
        let link_cache = Arc::new(LinkCache::new(Duration::from_secs(3600), Box::new(ReqwestLivenessProbe::default())));
        let zurg = Arc::new(FakeZurg {
            results: vec![CandidateSource {
                provenance: Provenance::Zurg,
                stable_key: "z1".to_string(),
                magnet_or_path: "/mnt/zurg/got.s01e02.mkv".to_string(),
                quality_label: "1080p".to_string(),
                resolution_height: Some(1080),
                size_bytes: None,
                cached_on_debrid: true,
                over_bandwidth: false,
                score: 1.0,
            }],
            direct_urls: HashMap::new(),
        });
        let indexer = Arc::new(FakeIndexer { results: vec![] });
        let resolver = Arc::new(SourceResolver::new(zurg.clone(), indexer));
        let validator = Arc::new(Validator::new(
            Arc::new(FakeProber {
                result: ProbeResult {
                    video_codec: "h264".to_string(),
                    audio_streams: vec![],
                    subtitle_streams: vec![],
                    has_chapters: false,
                    duration_secs: 100.0,
                    probe_time_ms: 10,
                    timed_out: false,
                    container_is_matroska_like: false,
                },
            }),
            ValidatorConfig {
                accepted_video_codecs: vec!["h264".into()],
                accepted_audio_codecs: vec!["aac".into()],
                audio_transcode_target: "aac".into(),
            },
        ));
        let debrid = Arc::new(FakeDebridClient::new(vec![]));
        let remuxer = Arc::new(FakeRemuxer {
            output_path: "/tmp/out.mp4".to_string(),
            should_fail: false,
        });
        let engine = Arc::new(JobEngine::new(
            registry.clone(),
            link_cache,
            resolver,
            validator,
            debrid,
            zurg,
            remuxer,
            "/vod/stream".to_string(),
            "/vod/processed".to_string(),
            TimeoutsConfig {
                dead_torrent_timeout_secs: 10,
                slow_start_timeout_secs: 12,
                active_start_timeout_secs: 30,
                stall_timeout_secs: 60,
                job_max_duration_secs: 300,
                first_sources_wait_secs: 1,
                first_sources_slow_wait_secs: 1,
                session_grace_secs: 5,
                session_check_deadline_secs: 8,
                session_idle_timeout_secs: 90,
                segment_fail_threshold: 3,
                fs_stat_timeout_secs: 10,
            },
            Arc::new(NoopHook),
        ));
        let metadata = Arc::new(FakeMetadataProvider {
            next: Some(NextEpisodeHint { content_ref: content_ref(2) }),
            markers: None,
        });
        (Prefetcher::new(engine, registry.clone(), metadata), registry)
    }

    fn user_ctx() -> UserCtx {
        UserCtx {
            user_id: "user-1".to_string(),
            platform: PlatformHint::Native,
            bandwidth_ceiling_mbps: None,
        }
    }

    #[tokio::test]
    async fn starts_a_new_prefetch_job_for_the_next_episode() {
        let (prefetcher, registry) = build();
        let id = prefetcher
            .prefetch_next(&content_ref(1), user_ctx(), PrefetchMode::Sequential)
            .await
            .unwrap()
            .unwrap();
        let job = registry.get(id).unwrap();
        assert!(job.is_prefetch);
        assert_eq!(job.content_ref.episode, Some(2));
    }

    #[tokio::test]
    async fn a_second_prefetch_call_deduplicates_against_the_first() {
        let (prefetcher, _registry) = build();
        let first = prefetcher
            .prefetch_next(&content_ref(1), user_ctx(), PrefetchMode::Sequential)
            .await
            .unwrap()
            .unwrap();
        let second = prefetcher
            .prefetch_next(&content_ref(1), user_ctx(), PrefetchMode::Sequential)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn promote_clears_the_prefetch_flag() {
        let (prefetcher, registry) = build();
        let id = prefetcher
            .prefetch_next(&content_ref(1), user_ctx(), PrefetchMode::Sequential)
            .await
            .unwrap()
            .unwrap();
        let promoted = prefetcher.promote(id).await.unwrap();
        assert!(!promoted.is_prefetch);
        let _ = registry;
    }
}
