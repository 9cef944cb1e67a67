//! The debrid provider collaborator (§4.3): hands a magnet to the provider
//! and polls its status until the adaptive timeout policy in `JobEngine`
//! aborts or it promotes to a direct URL.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebridState {
    MagnetConversion,
    Downloading,
    Downloaded,
}

#[derive(Debug, Clone)]
pub struct DebridStatus {
    pub state: DebridState,
    pub progress_percent: f32,
    pub seeders: u32,
    pub speed_bytes_per_sec: u64,
    /// Set once the file is ready on the debrid CDN.
    pub direct_url: Option<String>,
    pub file_name: Option<String>,
    /// Provider returned 403/451 (DMCA takedown) — abort, do not retry.
    pub dmca: bool,
}

#[async_trait]
pub trait DebridClient: Send + Sync {
    /// Submits the magnet and returns a handle id used for subsequent polls.
    async fn submit_magnet(&self, magnet: &str) -> anyhow::Result<String>;

    /// One status tick; the engine calls this repeatedly on its own interval.
    async fn poll(&self, handle: &str) -> anyhow::Result<DebridStatus>;

    /// Best-effort cleanup for an abandoned download; errors are swallowed
    /// by the caller (§4.3: "a best-effort torrent cleanup is fired").
    async fn cancel(&self, handle: &str) -> anyhow::Result<()>;
}

/// Scripted fake: returns a fixed sequence of statuses, one per `poll` call,
/// then repeats the last entry.
pub struct FakeDebridClient {
    pub ticks: Vec<DebridStatus>,
    calls: std::sync::atomic::AtomicUsize,
}

impl FakeDebridClient {
    pub fn new(ticks: Vec<DebridStatus>) -> Self {
        FakeDebridClient {
            ticks,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DebridClient for FakeDebridClient {
    async fn submit_magnet(&self, magnet: &str) -> anyhow::Result<String> {
        Ok(format!("handle-{magnet}"))
    }

    async fn poll(&self, _handle: &str) -> anyhow::Result<DebridStatus> {
        let idx = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let tick = self.ticks.get(idx).or_else(|| self.ticks.last()).cloned();
        tick.ok_or_else(|| anyhow::anyhow!("no ticks configured"))
    }

    async fn cancel(&self, _handle: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
