//! LinkCache (§3 LinkCacheEntry, §4.3 step 1): TTL-bounded cache of
//! (content key → direct stream URL), verified live on read.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::model::LinkCacheEntry;

/// A cheap liveness probe (HEAD / range-byte GET) against a candidate URL.
/// Boundary-crossing, so it's a narrow trait like the other collaborators —
/// the production implementation issues a real HTTP HEAD request.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_live(&self, url: &str) -> bool;
}

pub struct ReqwestLivenessProbe {
    client: reqwest::Client,
}

impl Default for ReqwestLivenessProbe {
    fn default() -> Self {
        ReqwestLivenessProbe {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

#[async_trait]
impl LivenessProbe for ReqwestLivenessProbe {
    async fn is_live(&self, url: &str) -> bool {
        self.client
            .head(url)
            .send()
            .await
            .map(|resp| resp.status().is_success() || resp.status().as_u16() == 206)
            .unwrap_or(false)
    }
}

pub struct LinkCache {
    entries: DashMap<String, LinkCacheEntry>,
    ttl: chrono::Duration,
    probe: Box<dyn LivenessProbe>,
}

impl LinkCache {
    pub fn new(ttl: Duration, probe: Box<dyn LivenessProbe>) -> Self {
        LinkCache {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)),
            probe,
        }
    }

    /// Returns a live entry, or `None` on miss/expiry/dead-on-probe — never
    /// a dead URL (§8 invariant 3). Verification runs outside the map's
    /// internal locking since `DashMap::remove` takes its own shard lock.
    pub async fn lookup(&self, content_key: &str) -> Option<LinkCacheEntry> {
        let entry = self.entries.get(content_key).map(|e| e.clone())?;
        if Utc::now().signed_duration_since(entry.inserted_at) > self.ttl {
            self.entries.remove(content_key);
            return None;
        }
        if self.probe.is_live(&entry.stream_url).await {
            Some(entry)
        } else {
            self.entries.remove(content_key);
            None
        }
    }

    pub fn upsert(&self, entry: LinkCacheEntry) {
        self.entries.insert(entry.content_key.clone(), entry);
    }

    /// Opportunistic expiry sweep; not the sole eviction path (§9 design
    /// note — avoid relying solely on an interval timer), used as a backstop
    /// by the periodic housekeeping job.
    pub fn compact(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now.signed_duration_since(e.inserted_at) > self.ttl)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysLive;
    #[async_trait]
    impl LivenessProbe for AlwaysLive {
        async fn is_live(&self, _url: &str) -> bool {
            true
        }
    }

    struct AlwaysDead;
    #[async_trait]
    impl LivenessProbe for AlwaysDead {
        async fn is_live(&self, _url: &str) -> bool {
            false
        }
    }

    fn entry(key: &str) -> LinkCacheEntry {
        LinkCacheEntry {
            content_key: key.to_string(),
            stream_url: "https://cdn.example/file".to_string(),
            file_name: "file.mkv".to_string(),
            resolution_height: Some(1080),
            size_bytes: None,
            inserted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn live_hit_returns_the_entry() {
        let cache = LinkCache::new(Duration::from_secs(3600), Box::new(AlwaysLive));
        cache.upsert(entry("278:movie"));
        assert!(cache.lookup("278:movie").await.is_some());
    }

    #[tokio::test]
    async fn dead_probe_evicts_and_misses() {
        let cache = LinkCache::new(Duration::from_secs(3600), Box::new(AlwaysDead));
        cache.upsert(entry("278:movie"));
        assert!(cache.lookup("278:movie").await.is_none());
        // Second lookup still misses — the dead entry was evicted, not retried.
        assert!(cache.lookup("278:movie").await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_misses_without_probing() {
        let cache = LinkCache::new(Duration::from_millis(0), Box::new(AlwaysLive));
        cache.upsert(entry("278:movie"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.lookup("278:movie").await.is_none());
    }

    #[tokio::test]
    async fn missing_key_is_a_plain_miss() {
        let cache = LinkCache::new(Duration::from_secs(3600), Box::new(AlwaysLive));
        assert!(cache.lookup("nope").await.is_none());
    }
}
