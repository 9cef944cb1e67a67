//! LiveTVProxy (§4.7): per-channel manifest rewrite with master→media
//! resolution, segment pass-through, and consecutive-failure-driven source
//! rotation shared by every client watching that channel.

use dashmap::DashMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

use crate::collaborators::LiveTvCatalog;
use crate::error::AppError;
use crate::model::ChannelSourceState;

pub struct FetchedSegment {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: bytes::Bytes,
}

pub struct LiveTvProxy {
    catalog: std::sync::Arc<dyn LiveTvCatalog>,
    client: reqwest::Client,
    channel_state: DashMap<String, ChannelSourceState>,
    proxy_base: String,
    segment_fail_threshold: u32,
}

impl LiveTvProxy {
    pub fn new(catalog: std::sync::Arc<dyn LiveTvCatalog>, proxy_base: String, segment_fail_threshold: u32) -> Self {
        LiveTvProxy {
            catalog,
            client: reqwest::Client::new(),
            channel_state: DashMap::new(),
            proxy_base,
            segment_fail_threshold,
        }
    }

    /// Fetches and rewrites the manifest for `channel_id`, rotating through
    /// sources starting at the channel's active index until one responds.
    pub async fn manifest(&self, channel_id: &str) -> Result<String, AppError> {
        let sources = self
            .catalog
            .source_urls(channel_id)
            .await
            .map_err(|e| AppError::Collaborator(e.to_string()))?;
        if sources.is_empty() {
            return Err(AppError::ChannelNotFound);
        }

        let active_index = self.channel_state.get(channel_id).map(|s| s.active_index).unwrap_or(0) % sources.len();
        let rotation = (0..sources.len()).map(|offset| (active_index + offset) % sources.len());

        for idx in rotation {
            let url = &sources[idx];
            match self.fetch_text(url).await {
                Ok((body, final_url)) => {
                    self.channel_state.insert(
                        channel_id.to_string(),
                        ChannelSourceState {
                            active_index: idx,
                            consecutive_fail_count: 0,
                        },
                    );
                    return self.resolve_to_media_playlist(channel_id, &body, &final_url).await;
                }
                Err(_) => continue,
            }
        }

        Err(AppError::BadStreamSources)
    }

    /// If `body` is a master playlist, fetches the first variant inline so
    /// the client always receives a media playlist (§4.7 step 3).
    async fn resolve_to_media_playlist(&self, channel_id: &str, body: &str, base_url: &str) -> Result<String, AppError> {
        if is_master_playlist(body) {
            let variant = first_variant_url(body).ok_or(AppError::BadStreamSources)?;
            let absolute = resolve_relative(base_url, &variant).ok_or(AppError::BadStreamSources)?;
            let (variant_body, variant_final_url) = self.fetch_text(&absolute).await.map_err(|_| AppError::BadStreamSources)?;
            return Ok(self.rewrite_manifest(channel_id, &variant_body, &variant_final_url));
        }
        Ok(self.rewrite_manifest(channel_id, body, base_url))
    }

    fn rewrite_manifest(&self, channel_id: &str, body: &str, base_url: &str) -> String {
        body.lines()
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return line.to_string();
                }
                match resolve_relative(base_url, trimmed) {
                    Some(absolute) => format!(
                        "{}/{}?url={}",
                        self.proxy_base.trim_end_matches('/'),
                        channel_id,
                        utf8_percent_encode(&absolute, NON_ALPHANUMERIC)
                    ),
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Proxies a segment (or recursively rewrites a nested sub-playlist),
    /// rotating the channel's active source after `segment_fail_threshold`
    /// consecutive failures.
    pub async fn segment(&self, channel_id: &str, target_url: &str) -> Result<FetchedSegment, AppError> {
        if target_url.ends_with(".m3u8") {
            match self.fetch_text(target_url).await {
                Ok((body, final_url)) => {
                    self.reset_fail_count(channel_id);
                    let rewritten = self.rewrite_manifest(channel_id, &body, &final_url);
                    return Ok(FetchedSegment {
                        content_type: Some("application/vnd.apple.mpegurl".to_string()),
                        content_length: Some(rewritten.len() as u64),
                        body: bytes::Bytes::from(rewritten),
                    });
                }
                Err(_) => {
                    self.record_segment_failure(channel_id);
                    return Err(AppError::BadStreamSources);
                }
            }
        }

        match self.client.get(target_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.reset_fail_count(channel_id);
                let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(String::from);
                let content_length = resp.content_length();
                let body = resp.bytes().await.map_err(|e| AppError::Collaborator(e.to_string()))?;
                Ok(FetchedSegment {
                    content_type,
                    content_length,
                    body,
                })
            }
            _ => {
                self.record_segment_failure(channel_id);
                Err(AppError::BadStreamSources)
            }
        }
    }

    fn reset_fail_count(&self, channel_id: &str) {
        if let Some(mut state) = self.channel_state.get_mut(channel_id) {
            state.consecutive_fail_count = 0;
        }
    }

    fn record_segment_failure(&self, channel_id: &str) {
        let mut entry = self.channel_state.entry(channel_id.to_string()).or_default();
        entry.consecutive_fail_count += 1;
        if entry.consecutive_fail_count >= self.segment_fail_threshold {
            // Source count isn't known here without another catalog call;
            // the caller's next `manifest` fetch re-derives it and the
            // modulo rotation in `manifest` self-corrects on wraparound.
            entry.active_index = entry.active_index.wrapping_add(1);
            entry.consecutive_fail_count = 0;
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<(String, String), AppError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Collaborator(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AppError::BadStreamSources);
        }
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| AppError::Collaborator(e.to_string()))?;
        Ok((body, final_url))
    }
}

fn is_master_playlist(body: &str) -> bool {
    body.lines().any(|l| l.trim().starts_with("#EXT-X-STREAM-INF"))
}

fn first_variant_url(body: &str) -> Option<String> {
    let mut lines = body.lines();
    while let Some(line) = lines.next() {
        if line.trim().starts_with("#EXT-X-STREAM-INF") {
            return lines.map(|l| l.trim()).find(|l| !l.is_empty() && !l.starts_with('#')).map(String::from);
        }
    }
    None
}

fn resolve_relative(base: &str, target: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    base_url.join(target).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCatalog {
        channels: HashMap<String, Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LiveTvCatalog for FakeCatalog {
        async fn source_urls(&self, channel_id: &str) -> anyhow::Result<Vec<String>> {
            self.channels.get(channel_id).cloned().ok_or_else(|| anyhow::anyhow!("unknown channel"))
        }
    }

    fn proxy(channels: HashMap<String, Vec<String>>) -> LiveTvProxy {
        LiveTvProxy::new(std::sync::Arc::new(FakeCatalog { channels }), "/livetv/stream/".to_string(), 3)
    }

    #[test]
    fn detects_master_playlists() {
        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=100\nlow.m3u8\n";
        assert!(is_master_playlist(master));
        let media = "#EXTM3U\n#EXTINF:10,\nseg1.ts\n";
        assert!(!is_master_playlist(media));
    }

    #[test]
    fn finds_the_first_variant_url() {
        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=100\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=500\nhigh.m3u8\n";
        assert_eq!(first_variant_url(master).unwrap(), "low.m3u8");
    }

    #[test]
    fn resolves_relative_segment_urls_against_the_final_manifest_url() {
        let resolved = resolve_relative("https://cdn.example/path/index.m3u8", "seg1.ts").unwrap();
        assert_eq!(resolved, "https://cdn.example/path/seg1.ts");
    }

    #[test]
    fn rewrite_manifest_inserts_the_path_separator_even_with_no_trailing_slash_base() {
        let p = LiveTvProxy::new(std::sync::Arc::new(FakeCatalog { channels: HashMap::new() }), "/livetv/stream".to_string(), 3);
        let body = "#EXTM3U\nseg1.ts\n";
        let rewritten = p.rewrite_manifest("bbc", body, "https://cdn.example/path/index.m3u8");
        assert!(rewritten.contains("/livetv/stream/bbc?url="));
    }

    #[tokio::test]
    async fn unknown_channel_maps_to_channel_not_found() {
        let p = proxy(HashMap::new());
        let err = p.manifest("missing").await.unwrap_err();
        assert!(matches!(err, AppError::ChannelNotFound));
    }

    #[test]
    fn segment_failures_rotate_the_active_source_after_the_threshold() {
        let mut channels = HashMap::new();
        channels.insert("bbc".to_string(), vec!["https://a".to_string(), "https://b".to_string()]);
        let p = proxy(channels);
        for _ in 0..3 {
            p.record_segment_failure("bbc");
        }
        let state = p.channel_state.get("bbc").unwrap();
        assert_eq!(state.active_index, 1);
        assert_eq!(state.consecutive_fail_count, 0);
    }

    #[test]
    fn a_success_resets_the_fail_counter() {
        let p = proxy(HashMap::new());
        p.record_segment_failure("bbc");
        p.record_segment_failure("bbc");
        p.reset_fail_count("bbc");
        assert_eq!(p.channel_state.get("bbc").unwrap().consecutive_fail_count, 0);
    }
}
