//! ScoredQueue (§4.1): priority queue over `CandidateSource`, deduplicated by
//! stable key, signaled via `Notify` rather than polled on a fixed interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::model::CandidateSource;

/// How long `pop` waits for a push before re-checking completion.
const POP_WAIT: Duration = Duration::from_millis(200);

struct Inner {
    items: Vec<CandidateSource>,
    tried: HashSet<String>,
    search_complete: bool,
}

pub struct ScoredQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for ScoredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoredQueue {
    pub fn new() -> Self {
        ScoredQueue {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                tried: HashSet::new(),
                search_complete: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Merge new candidates by stable key, re-sort with in-budget candidates
    /// first (§4.2/§4.3: over-bandwidth candidates rank after the in-budget
    /// set) and descending score with insertion-order tie-break within each
    /// group, and signal waiters. `is_final` marks the resolver as done; it
    /// latches true and never resets.
    pub async fn push(&self, candidates: Vec<CandidateSource>, is_final: bool) {
        let mut guard = self.inner.lock().await;
        let existing: HashSet<String> = guard.items.iter().map(|c| c.stable_key.clone()).collect();
        for candidate in candidates {
            if guard.tried.contains(&candidate.stable_key) || existing.contains(&candidate.stable_key) {
                continue;
            }
            guard.items.push(candidate);
        }
        // Stable sort preserves insertion order among equal (over_bandwidth, score) keys.
        guard.items.sort_by(|a, b| {
            a.over_bandwidth
                .cmp(&b.over_bandwidth)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        if is_final {
            guard.search_complete = true;
        }
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Highest-scored unpopped candidate, or `(None, true)` once the queue is
    /// drained and the resolver has signaled completion.
    pub async fn pop(&self) -> (Option<CandidateSource>, bool) {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if !guard.items.is_empty() {
                    let candidate = guard.items.remove(0);
                    guard.tried.insert(candidate.stable_key.clone());
                    return (Some(candidate), false);
                }
                if guard.search_complete {
                    return (None, true);
                }
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POP_WAIT) => {}
            }
        }
    }

    /// Blocks until at least one candidate is available or the resolver has
    /// signaled completion, without consuming anything. Used by the engine
    /// to bound the "wait for first sources" phase (§4.3) without racing the
    /// actual `pop` loop over who gets the item.
    pub async fn wait_until_ready(&self) -> bool {
        loop {
            {
                let guard = self.inner.lock().await;
                if !guard.items.is_empty() {
                    return true;
                }
                if guard.search_complete {
                    return false;
                }
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POP_WAIT) => {}
            }
        }
    }

    /// Prevents re-selection if a stable key reappears from a later push.
    pub async fn mark_tried(&self, stable_key: &str) {
        self.inner.lock().await.tried.insert(stable_key.to_string());
    }

    pub async fn is_search_complete(&self) -> bool {
        self.inner.lock().await.search_complete
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }
}
