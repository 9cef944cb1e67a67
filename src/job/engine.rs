//! JobEngine (§4.3): the pipeline that turns a `ContentRef` into a playable
//! stream. One `run` per job, spawned off `start`; every write back to the
//! registry goes through `JobRegistry::update` so an abandoned candidate's
//! late result can never clobber a job that has already moved on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cache::LinkCache;
use crate::collaborators::debrid::DebridState;
use crate::collaborators::{DebridClient, Remuxer, ZurgCatalog};
use crate::config::TimeoutsConfig;
use crate::error::CandidateFailure;
use crate::job::registry::JobRegistry;
use crate::model::{CandidateSource, ContentRef, Job, JobId, JobStatus, LinkCacheEntry, PlatformHint, Provenance};
use crate::queue::ScoredQueue;
use crate::rangeproxy::encode_stream_id;
use crate::resolver::{Excluded, SourceResolver};
use crate::validator::{ValidationDecision, Validator};

/// How often `drive_debrid` re-polls the provider. Not a spec constant —
/// just the pipeline's internal tick rate.
const DEBRID_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct UserCtx {
    pub user_id: String,
    pub platform: PlatformHint,
    pub bandwidth_ceiling_mbps: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub prefetch: bool,
    pub excluded: Excluded,
}

/// Where a candidate's eventual URL came from, and whether it's already a
/// local proxy route (in which case the link cache must not remember it).
struct PromotedSource {
    url: String,
    file_name: String,
    is_local_route: bool,
}

#[derive(Clone)]
pub struct JobEngine {
    registry: Arc<JobRegistry>,
    link_cache: Arc<LinkCache>,
    resolver: Arc<SourceResolver>,
    validator: Arc<Validator>,
    debrid: Arc<dyn DebridClient>,
    zurg: Arc<dyn ZurgCatalog>,
    remuxer: Arc<dyn Remuxer>,
    rangeproxy_base: String,
    processed_base: String,
    timeouts: TimeoutsConfig,
    enrichers: Arc<dyn PostCompletionHook>,
}

/// Callback fired once a job reaches `Completed`, so background enrichment
/// (§4.9/§4.10) can be wired in without the engine depending on its concrete
/// implementation.
#[async_trait::async_trait]
pub trait PostCompletionHook: Send + Sync {
    async fn on_completed(&self, job_id: JobId, content_ref: ContentRef, has_english_subtitle: bool);
}

pub struct NoopHook;

#[async_trait::async_trait]
impl PostCompletionHook for NoopHook {
    async fn on_completed(&self, _job_id: JobId, _content_ref: ContentRef, _has_english_subtitle: bool) {}
}

impl JobEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<JobRegistry>,
        link_cache: Arc<LinkCache>,
        resolver: Arc<SourceResolver>,
        validator: Arc<Validator>,
        debrid: Arc<dyn DebridClient>,
        zurg: Arc<dyn ZurgCatalog>,
        remuxer: Arc<dyn Remuxer>,
        rangeproxy_base: String,
        processed_base: String,
        timeouts: TimeoutsConfig,
        enrichers: Arc<dyn PostCompletionHook>,
    ) -> Self {
        JobEngine {
            registry,
            link_cache,
            resolver,
            validator,
            debrid,
            zurg,
            remuxer,
            rangeproxy_base,
            processed_base,
            timeouts,
            enrichers,
        }
    }

    /// Creates the job and spawns its pipeline in the background; returns
    /// immediately with the id a client can poll via `progress`.
    pub fn start(&self, content_ref: ContentRef, user_ctx: UserCtx, opts: StartOptions) -> JobId {
        let id = uuid::Uuid::new_v4();
        let job = Job::new(id, content_ref.clone(), user_ctx.user_id.clone(), opts.prefetch);
        self.registry.create(job);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(id, content_ref, user_ctx, opts.excluded).await;
        });
        id
    }

    pub fn progress(&self, job_id: JobId) -> Option<Job> {
        self.registry.get(job_id)
    }

    /// Removes the job; any in-flight candidate work is left to finish and
    /// its eventual result is silently dropped since `update` can no longer
    /// find the id.
    pub fn cancel(&self, job_id: JobId) {
        self.registry.delete(job_id);
    }

    /// Starts a fresh attempt for the same content, excluding every source
    /// already tried by the reported job.
    pub fn report_bad(&self, job_id: JobId, user_ctx: UserCtx) -> Option<JobId> {
        let job = self.registry.get(job_id)?;
        let excluded = Excluded {
            hashes: job.excluded_keys(),
            file_paths: job.excluded_keys(),
        };
        Some(self.start(
            job.content_ref,
            user_ctx,
            StartOptions {
                prefetch: job.is_prefetch,
                excluded,
            },
        ))
    }

    /// Marks a prefetched job as the user's active selection.
    pub fn promote(&self, job_id: JobId) -> Option<Job> {
        self.registry.update(job_id, false, |j| j.is_prefetch = false);
        self.registry.get(job_id)
    }

    async fn run(self, job_id: JobId, content_ref: ContentRef, user_ctx: UserCtx, excluded: Excluded) {
        let started = Instant::now();
        let max_duration = Duration::from_secs(self.timeouts.job_max_duration_secs);
        let content_key = content_ref.content_key();

        if let Some(cached) = self.link_cache.lookup(&content_key).await {
            if let Ok(decision) = self.validator.validate(&cached.stream_url, user_ctx.platform).await {
                info!(job_id = %job_id, "serving from link cache");
                let result = self
                    .finalize_success(
                        job_id,
                        &content_ref,
                        PromotedSource {
                            url: cached.stream_url,
                            file_name: cached.file_name,
                            is_local_route: false,
                        },
                        decision,
                        false,
                    )
                    .await;
                if result.is_ok() {
                    return;
                }
                warn!(job_id = %job_id, "cached link failed to finalize, falling back to resolution");
            }
        }

        let queue = ScoredQueue::shared();
        {
            let resolver = Arc::clone(&self.resolver);
            let cr = content_ref.clone();
            let q = Arc::clone(&queue);
            let bw = user_ctx.bandwidth_ceiling_mbps;
            let exc = excluded.clone();
            tokio::spawn(async move {
                resolver.resolve(&cr, bw, &exc, &q).await;
            });
        }

        let first_wait = Duration::from_secs(self.timeouts.first_sources_wait_secs);
        let slow_wait = Duration::from_secs(self.timeouts.first_sources_slow_wait_secs);
        let has_any = tokio::time::timeout(first_wait, queue.wait_until_ready())
            .await
            .unwrap_or(false)
            || tokio::time::timeout(slow_wait, queue.wait_until_ready())
                .await
                .unwrap_or(false);
        if !has_any {
            self.registry.update(job_id, false, |j| {
                j.status = JobStatus::Error;
                j.error_kind = Some("NO_SOURCES".to_string());
                j.human_message = "no sources found".to_string();
            });
            return;
        }

        loop {
            if started.elapsed() >= max_duration {
                self.registry.update(job_id, false, |j| {
                    j.status = JobStatus::Error;
                    j.error_kind = Some("JOB_DEADLINE".to_string());
                    j.human_message = "job exceeded its maximum duration".to_string();
                });
                return;
            }

            if self.registry.get(job_id).is_none() {
                // Cancelled out from under us; stop spending effort on it.
                return;
            }

            let (candidate, complete) = queue.pop().await;
            let Some(candidate) = candidate else {
                if complete {
                    break;
                }
                continue;
            };

            let applied = self.registry.update(job_id, false, |j| {
                j.record_attempt(&candidate.stable_key);
                j.status = JobStatus::Searching;
                j.human_message = format!("trying {} ({:?})", candidate.quality_label, candidate.provenance);
            });
            if !applied {
                return;
            }

            match self.promote_candidate(job_id, &candidate).await {
                Ok(promoted) => match self.validator.validate(&promoted.url, user_ctx.platform).await {
                    Ok(decision) => {
                        match self
                            .finalize_success(job_id, &content_ref, promoted, decision, candidate.over_bandwidth)
                            .await
                        {
                            Ok(()) => return,
                            Err(failure) => {
                                warn!(job_id = %job_id, reason = failure.as_reason(), "candidate failed during finalization");
                                self.registry
                                    .update(job_id, false, |j| j.error_kind = Some(failure.as_reason().to_string()));
                            }
                        }
                    }
                    Err(failure) => {
                        warn!(job_id = %job_id, reason = failure.as_reason(), "candidate failed validation");
                        self.registry
                            .update(job_id, false, |j| j.error_kind = Some(failure.as_reason().to_string()));
                    }
                },
                Err(failure) => {
                    warn!(job_id = %job_id, reason = failure.as_reason(), "candidate failed to promote");
                    self.registry
                        .update(job_id, false, |j| j.error_kind = Some(failure.as_reason().to_string()));
                }
            }
        }

        self.registry.update(job_id, false, |j| {
            j.status = JobStatus::Error;
            j.error_kind = Some(j.error_kind.clone().unwrap_or_else(|| "ALL_SOURCES_EXHAUSTED".to_string()));
            j.human_message = "no playable source found".to_string();
        });
    }

    /// Turns a candidate into a usable URL: a Zurg hit tries direct-resolve
    /// first, falling back to a `RangeProxy` route unconditionally when the
    /// catalog can't resolve it right now; a Prowlarr hit goes through the
    /// debrid client's adaptive-timeout poll loop.
    async fn promote_candidate(&self, job_id: JobId, candidate: &CandidateSource) -> Result<PromotedSource, CandidateFailure> {
        match candidate.provenance {
            Provenance::Zurg => match self.zurg.resolve_direct_url(&candidate.magnet_or_path).await {
                Ok(Some(url)) => Ok(PromotedSource {
                    file_name: derive_file_name(&candidate.magnet_or_path),
                    url,
                    is_local_route: false,
                }),
                Ok(None) | Err(_) => {
                    let stream_id = encode_stream_id(&candidate.magnet_or_path);
                    Ok(PromotedSource {
                        url: format!("{}/{}", self.rangeproxy_base, stream_id),
                        file_name: derive_file_name(&candidate.magnet_or_path),
                        is_local_route: true,
                    })
                }
            },
            Provenance::Prowlarr => self.drive_debrid(job_id, candidate).await,
        }
    }

    async fn drive_debrid(&self, job_id: JobId, candidate: &CandidateSource) -> Result<PromotedSource, CandidateFailure> {
        let handle = self
            .debrid
            .submit_magnet(&candidate.magnet_or_path)
            .await
            .map_err(|_| CandidateFailure::SourceDead)?;

        self.registry.update(job_id, false, |j| j.status = JobStatus::Downloading);

        let mut last_progress_at = Instant::now();
        let mut last_progress_percent = 0.0f32;

        loop {
            let status = self.debrid.poll(&handle).await.map_err(|_| CandidateFailure::SourceDead)?;

            if status.dmca {
                let _ = self.debrid.cancel(&handle).await;
                return Err(CandidateFailure::SourceDmca);
            }

            if status.progress_percent > last_progress_percent {
                last_progress_percent = status.progress_percent;
                last_progress_at = Instant::now();
            }
            let stuck_for = last_progress_at.elapsed();

            let dead_torrent = matches!(status.state, DebridState::Downloading | DebridState::MagnetConversion)
                && status.seeders == 0
                && status.speed_bytes_per_sec == 0
                && stuck_for >= Duration::from_secs(self.timeouts.dead_torrent_timeout_secs);
            if dead_torrent {
                let _ = self.debrid.cancel(&handle).await;
                return Err(CandidateFailure::SourceTimeout);
            }

            if status.progress_percent < 1.0 {
                let no_activity_yet = status.seeders == 0 && status.speed_bytes_per_sec == 0;
                let slow_start_exceeded = no_activity_yet && stuck_for >= Duration::from_secs(self.timeouts.slow_start_timeout_secs);
                let active_start_exceeded =
                    !no_activity_yet && stuck_for >= Duration::from_secs(self.timeouts.active_start_timeout_secs);
                if slow_start_exceeded || active_start_exceeded {
                    let _ = self.debrid.cancel(&handle).await;
                    return Err(CandidateFailure::SourceTimeout);
                }
            }

            if stuck_for >= Duration::from_secs(self.timeouts.stall_timeout_secs) {
                let _ = self.debrid.cancel(&handle).await;
                return Err(CandidateFailure::SourceTimeout);
            }

            if matches!(status.state, DebridState::Downloaded) {
                if let Some(url) = status.direct_url {
                    return Ok(PromotedSource {
                        file_name: status.file_name.unwrap_or_else(|| candidate.magnet_or_path.clone()),
                        url,
                        is_local_route: false,
                    });
                }
            }

            tokio::time::sleep(DEBRID_POLL_INTERVAL).await;
        }
    }

    /// Runs the validator's remux plan if one is needed, writes a cache
    /// entry for direct (non-local) URLs, and marks the job complete. On a
    /// remux failure the caller's candidate loop treats this as just another
    /// failed candidate rather than a terminal job error.
    async fn finalize_success(
        &self,
        job_id: JobId,
        content_ref: &ContentRef,
        promoted: PromotedSource,
        decision: ValidationDecision,
        over_bandwidth: bool,
    ) -> Result<(), CandidateFailure> {
        let needs_remux = decision.plan.stream_copy_to_mp4
            || !matches!(decision.plan.audio_action, crate::collaborators::media::AudioAction::None)
            || decision.plan.clean_subtitles;

        let mut final_url = promoted.url.clone();
        let mut processed_path = None;

        if needs_remux {
            self.registry.update(job_id, false, |j| j.status = JobStatus::Processing);
            match self.remuxer.execute(&promoted.url, &decision.plan).await {
                Ok(path) => {
                    final_url = format!("{}/{}", self.processed_base, job_id);
                    processed_path = Some(path);
                }
                Err(_) => return Err(CandidateFailure::RemuxFailed),
            }
        }

        let is_local_route = promoted.is_local_route || processed_path.is_some();
        if !is_local_route {
            self.link_cache.upsert(LinkCacheEntry {
                content_key: content_ref.content_key(),
                stream_url: final_url.clone(),
                file_name: promoted.file_name.clone(),
                resolution_height: None,
                size_bytes: None,
                inserted_at: chrono::Utc::now(),
            });
        }

        self.registry.update(job_id, false, |j| {
            j.status = JobStatus::Completed;
            j.progress_percent = 100;
            j.human_message = "ready".to_string();
            j.stream_url = Some(final_url.clone());
            j.file_name = Some(promoted.file_name.clone());
            j.processed_file_path = processed_path.clone();
            j.embedded_subtitle_tracks = decision.embedded_subtitle_tracks.clone();
            j.recommended_subtitle_index = decision.recommended_subtitle_index;
            j.used_over_bandwidth_fallback = j.used_over_bandwidth_fallback || over_bandwidth;
        });

        self.enrichers
            .on_completed(job_id, content_ref.clone(), decision.has_english_subtitle)
            .await;
        Ok(())
    }
}

/// Best-effort display name: a magnet's `dn=` parameter, or the trailing
/// path segment for a Zurg file path.
fn derive_file_name(source: &str) -> String {
    if let Some(idx) = source.find("dn=") {
        let rest = &source[idx + 3..];
        let end = rest.find('&').unwrap_or(rest.len());
        return percent_encoding::percent_decode_str(&rest[..end])
            .decode_utf8_lossy()
            .replace('+', " ");
    }
    source.rsplit('/').next().unwrap_or(source).to_string()
}
