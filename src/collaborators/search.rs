//! Source search collaborators (§4.2, §6): Prowlarr-style indexer search and
//! the local Zurg catalog.

use async_trait::async_trait;

use crate::model::{CandidateSource, ContentRef};

#[async_trait]
pub trait IndexerSearch: Send + Sync {
    /// Slower, may legitimately return zero results; failures are tolerated
    /// by the resolver and never abort the sibling Zurg lookup.
    async fn search(&self, content_ref: &ContentRef) -> anyhow::Result<Vec<CandidateSource>>;
}

#[async_trait]
pub trait ZurgCatalog: Send + Sync {
    /// Fast, local catalog lookup.
    async fn search(&self, content_ref: &ContentRef) -> anyhow::Result<Vec<CandidateSource>>;

    /// Attempts to turn a Zurg file path into a direct debrid URL. `None`
    /// means "not resolvable right now" — the engine falls back to a
    /// `RangeProxy` URL unconditionally (see DESIGN.md's open-question note).
    async fn resolve_direct_url(&self, file_path: &str) -> anyhow::Result<Option<String>>;
}

/// Deterministic in-memory fake used by unit/integration tests.
pub struct FakeIndexer {
    pub results: Vec<CandidateSource>,
}

#[async_trait]
impl IndexerSearch for FakeIndexer {
    async fn search(&self, _content_ref: &ContentRef) -> anyhow::Result<Vec<CandidateSource>> {
        Ok(self.results.clone())
    }
}

pub struct FakeZurg {
    pub results: Vec<CandidateSource>,
    pub direct_urls: std::collections::HashMap<String, String>,
}

#[async_trait]
impl ZurgCatalog for FakeZurg {
    async fn search(&self, _content_ref: &ContentRef) -> anyhow::Result<Vec<CandidateSource>> {
        Ok(self.results.clone())
    }

    async fn resolve_direct_url(&self, file_path: &str) -> anyhow::Result<Option<String>> {
        Ok(self.direct_urls.get(file_path).cloned())
    }
}
