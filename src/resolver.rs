//! SourceResolver (§4.2): fans out to Zurg + Prowlarr concurrently, pushes
//! surviving batches into a `ScoredQueue`, signals completion exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::collaborators::{IndexerSearch, ZurgCatalog};
use crate::model::ContentRef;
use crate::queue::ScoredQueue;

#[derive(Debug, Clone, Default)]
pub struct Excluded {
    pub hashes: HashSet<String>,
    pub file_paths: HashSet<String>,
}

impl Excluded {
    fn contains(&self, stable_key: &str) -> bool {
        self.hashes.contains(stable_key) || self.file_paths.contains(stable_key)
    }
}

pub struct SourceResolver {
    zurg: Arc<dyn ZurgCatalog>,
    indexer: Arc<dyn IndexerSearch>,
}

impl SourceResolver {
    pub fn new(zurg: Arc<dyn ZurgCatalog>, indexer: Arc<dyn IndexerSearch>) -> Self {
        SourceResolver { zurg, indexer }
    }

    /// Runs both providers concurrently, pushing each provider's surviving
    /// batch into `queue` as it completes, then signals search completion
    /// exactly once regardless of how many providers failed.
    pub async fn resolve(
        &self,
        content_ref: &ContentRef,
        bandwidth_ceiling_mbps: Option<f64>,
        excluded: &Excluded,
        queue: &ScoredQueue,
    ) {
        let zurg_fut = self.zurg.search(content_ref);
        let indexer_fut = self.indexer.search(content_ref);
        let (zurg_result, indexer_result) = tokio::join!(zurg_fut, indexer_fut);

        for (label, result) in [("zurg", zurg_result), ("prowlarr", indexer_result)] {
            match result {
                Ok(mut batch) => {
                    batch.retain(|c| !excluded.contains(&c.stable_key));
                    if let Some(ceiling) = bandwidth_ceiling_mbps {
                        for candidate in &mut batch {
                            candidate.over_bandwidth = estimate_exceeds_ceiling(candidate, ceiling);
                        }
                    }
                    if !batch.is_empty() {
                        queue.push(batch, false).await;
                    }
                }
                Err(err) => {
                    warn!(provider = label, error = %err, "source provider failed; continuing with remaining providers");
                }
            }
        }

        queue.push(vec![], true).await;
    }
}

/// A stand-in bitrate estimate: resolution-derived, since the candidate type
/// doesn't carry a measured bitrate. Over-bandwidth candidates are still
/// pushed (§4.2) but ranked after in-budget ones — `ScoredQueue::push` sorts
/// on `(over_bandwidth, Reverse(score))`, so this flag takes priority over
/// score when ordering the queue.
fn estimate_exceeds_ceiling(candidate: &crate::model::CandidateSource, ceiling_mbps: f64) -> bool {
    let assumed_mbps = match candidate.resolution_height {
        Some(h) if h >= 2160 => 35.0,
        Some(h) if h >= 1080 => 8.0,
        Some(h) if h >= 720 => 5.0,
        _ => 2.5,
    };
    assumed_mbps > ceiling_mbps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FakeIndexer, FakeZurg};
    use crate::model::{CandidateSource, ContentKind, PlatformHint, Provenance};
    use std::collections::HashMap;

    fn content_ref() -> ContentRef {
        ContentRef {
            external_id: "550".to_string(),
            kind: ContentKind::Movie,
            season: None,
            episode: None,
            display_title: "Fight Club".to_string(),
            year: Some(1999),
            platform_hint: PlatformHint::Native,
        }
    }

    fn candidate(key: &str, provenance: Provenance, height: u32) -> CandidateSource {
        CandidateSource {
            provenance,
            stable_key: key.to_string(),
            magnet_or_path: key.to_string(),
            quality_label: "1080p".to_string(),
            resolution_height: Some(height),
            size_bytes: None,
            cached_on_debrid: provenance == Provenance::Zurg,
            over_bandwidth: false,
            score: 1.0,
        }
    }

    #[tokio::test]
    async fn pushes_surviving_results_and_signals_completion_once() {
        let zurg = Arc::new(FakeZurg {
            results: vec![candidate("z1", Provenance::Zurg, 1080)],
            direct_urls: HashMap::new(),
        });
        let indexer = Arc::new(FakeIndexer {
            results: vec![candidate("p1", Provenance::Prowlarr, 1080)],
        });
        let resolver = SourceResolver::new(zurg, indexer);
        let queue = ScoredQueue::new();
        resolver.resolve(&content_ref(), None, &Excluded::default(), &queue).await;
        assert!(queue.is_search_complete().await);
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn excluded_keys_are_filtered_before_push() {
        let zurg = Arc::new(FakeZurg {
            results: vec![candidate("z1", Provenance::Zurg, 1080)],
            direct_urls: HashMap::new(),
        });
        let indexer = Arc::new(FakeIndexer { results: vec![] });
        let resolver = SourceResolver::new(zurg, indexer);
        let queue = ScoredQueue::new();
        let mut excluded = Excluded::default();
        excluded.file_paths.insert("z1".to_string());
        resolver.resolve(&content_ref(), None, &excluded, &queue).await;
        assert_eq!(queue.len().await, 0);
    }

    struct FailingIndexer;

    #[async_trait::async_trait]
    impl IndexerSearch for FailingIndexer {
        async fn search(&self, _content_ref: &ContentRef) -> anyhow::Result<Vec<CandidateSource>> {
            anyhow::bail!("indexer unreachable")
        }
    }

    #[tokio::test]
    async fn one_provider_failing_does_not_abort_the_other() {
        let zurg = Arc::new(FakeZurg {
            results: vec![candidate("z1", Provenance::Zurg, 1080)],
            direct_urls: HashMap::new(),
        });
        let indexer = Arc::new(FailingIndexer);
        let resolver = SourceResolver::new(zurg, indexer);
        let queue = ScoredQueue::new();
        resolver.resolve(&content_ref(), None, &Excluded::default(), &queue).await;
        assert!(queue.is_search_complete().await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn over_ceiling_candidates_are_still_pushed_but_flagged() {
        let zurg = Arc::new(FakeZurg {
            results: vec![candidate("z1", Provenance::Zurg, 2160)],
            direct_urls: HashMap::new(),
        });
        let indexer = Arc::new(FakeIndexer { results: vec![] });
        let resolver = SourceResolver::new(zurg, indexer);
        let queue = ScoredQueue::new();
        resolver.resolve(&content_ref(), Some(5.0), &Excluded::default(), &queue).await;
        let (candidate, _) = queue.pop().await;
        assert!(candidate.unwrap().over_bandwidth);
    }
}
