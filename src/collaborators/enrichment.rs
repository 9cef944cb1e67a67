//! Background-enricher collaborators (§4.9, §4.10): subtitle acquisition and
//! metadata lookups. Every call here is best-effort; failures are logged by
//! the caller and never surface to the client.

use async_trait::async_trait;

use crate::model::{ContentRef, NextEpisodeHint, SkipMarkers};

#[derive(Debug, Clone)]
pub enum PrefetchMode {
    Sequential,
    Random,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn next_episode(&self, current: &ContentRef, mode: PrefetchMode) -> anyhow::Result<Option<NextEpisodeHint>>;

    async fn skip_markers(&self, content_ref: &ContentRef) -> anyhow::Result<Option<SkipMarkers>>;
}

#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Cache lookup keyed by (content, language, video hash); `None` means
    /// never cached.
    async fn cached(&self, content_ref: &ContentRef, language: &str, video_hash: &str) -> anyhow::Result<Option<String>>;

    /// External subtitle search + download.
    async fn fetch(&self, content_ref: &ContentRef, language: &str) -> anyhow::Result<Option<String>>;

    /// Synchronizes a subtitle file's timing against the stream. Offset
    /// derivation is an external black box (DESIGN.md open question).
    async fn sync(&self, stream_url: &str, subtitle_path: &str) -> anyhow::Result<String>;
}

pub struct FakeMetadataProvider {
    pub next: Option<NextEpisodeHint>,
    pub markers: Option<SkipMarkers>,
}

#[async_trait]
impl MetadataProvider for FakeMetadataProvider {
    async fn next_episode(&self, _current: &ContentRef, _mode: PrefetchMode) -> anyhow::Result<Option<NextEpisodeHint>> {
        Ok(self.next.clone())
    }

    async fn skip_markers(&self, _content_ref: &ContentRef) -> anyhow::Result<Option<SkipMarkers>> {
        Ok(self.markers.clone())
    }
}

pub struct FakeSubtitleProvider {
    pub cached_path: Option<String>,
    pub fetched_path: Option<String>,
}

#[async_trait]
impl SubtitleProvider for FakeSubtitleProvider {
    async fn cached(&self, _content_ref: &ContentRef, _language: &str, _video_hash: &str) -> anyhow::Result<Option<String>> {
        Ok(self.cached_path.clone())
    }

    async fn fetch(&self, _content_ref: &ContentRef, _language: &str) -> anyhow::Result<Option<String>> {
        Ok(self.fetched_path.clone())
    }

    async fn sync(&self, _stream_url: &str, subtitle_path: &str) -> anyhow::Result<String> {
        Ok(format!("{subtitle_path}.synced"))
    }
}
