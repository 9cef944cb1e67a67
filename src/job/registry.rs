//! JobRegistry (§4.4): the sole synchronizer for per-job state. Every write
//! to a `Job` goes through `update`, which enforces the terminal-state guard
//! from §3's invariants before an orphaned (abandoned-candidate) write can
//! land.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::model::{Job, JobId, JobStatus};

pub struct JobRegistry {
    active: DashMap<JobId, Job>,
    terminal_since: DashMap<JobId, Instant>,
    history: Mutex<VecDeque<Job>>,
    history_capacity: usize,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(history_capacity: usize, retention: Duration) -> Self {
        JobRegistry {
            active: DashMap::new(),
            terminal_since: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            retention,
        }
    }

    pub fn create(&self, job: Job) -> JobId {
        let id = job.id;
        self.active.insert(id, job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.active
            .get(&id)
            .map(|entry| entry.clone())
            .or_else(|| self.history.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    /// Applies `f` to the job if present. When `from_orphan` is true and the
    /// job has already reached a terminal state, the write is dropped
    /// entirely — this is the guard required by §3 and §4.3's orphan-write
    /// invariant. Returns whether the update was applied.
    pub fn update<F>(&self, id: JobId, from_orphan: bool, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let Some(mut entry) = self.active.get_mut(&id) else {
            return false;
        };
        if from_orphan && entry.status.is_terminal() {
            debug!(job_id = %id, "dropped orphan write to a terminal job");
            return false;
        }
        let was_terminal = entry.status.is_terminal();
        f(&mut entry);
        if !was_terminal && entry.status.is_terminal() {
            self.terminal_since.insert(id, Instant::now());
        }
        true
    }

    pub fn delete(&self, id: JobId) {
        self.active.remove(&id);
        self.terminal_since.remove(&id);
    }

    pub fn get_all_active(&self) -> Vec<Job> {
        self.active.iter().map(|entry| entry.clone()).collect()
    }

    pub fn get_completed_history(&self) -> Vec<Job> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Best-effort playback tracking; actual analytics storage is external.
    pub fn track_playback(&self, id: JobId) {
        debug!(job_id = %id, "playback tracked");
    }

    /// Moves jobs that have been terminal for longer than `retention` from
    /// the active map into the bounded history ring. Called by the
    /// periodic housekeeping sweep, not on a per-request basis.
    pub fn sweep_retention(&self) {
        let now = Instant::now();
        let expired: Vec<JobId> = self
            .terminal_since
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) >= self.retention)
            .map(|entry| *entry.key())
            .collect();

        for id in expired {
            self.terminal_since.remove(&id);
            if let Some((_, job)) = self.active.remove(&id) {
                let mut history = self.history.lock().unwrap();
                if history.len() >= self.history_capacity {
                    history.pop_front();
                }
                history.push_back(job);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentKind, ContentRef, PlatformHint};
    use uuid::Uuid;

    fn job() -> Job {
        Job::new(
            Uuid::new_v4(),
            ContentRef {
                external_id: "1".to_string(),
                kind: ContentKind::Movie,
                season: None,
                episode: None,
                display_title: "Test".to_string(),
                year: None,
                platform_hint: PlatformHint::Native,
            },
            "user-1".to_string(),
            false,
        )
    }

    #[test]
    fn orphan_update_is_dropped_once_job_is_terminal() {
        let registry = JobRegistry::new(256, Duration::from_secs(30));
        let id = registry.create(job());
        registry.update(id, false, |j| {
            j.status = JobStatus::Completed;
            j.stream_url = Some("https://cdn/a".to_string());
        });
        let applied = registry.update(id, true, |j| {
            j.stream_url = Some("https://cdn/orphan".to_string());
        });
        assert!(!applied);
        assert_eq!(registry.get(id).unwrap().stream_url.unwrap(), "https://cdn/a");
    }

    #[test]
    fn non_orphan_update_to_a_terminal_job_is_still_rejected_by_callers_that_pass_from_orphan_false_only_when_appropriate() {
        // Non-orphan updates (e.g. a later background enricher) are allowed
        // to continue writing non-stream fields after completion.
        let registry = JobRegistry::new(256, Duration::from_secs(30));
        let id = registry.create(job());
        registry.update(id, false, |j| j.status = JobStatus::Completed);
        let applied = registry.update(id, false, |j| j.skip_markers = None);
        assert!(applied);
    }

    #[test]
    fn sweep_moves_terminal_jobs_past_retention_into_history() {
        let registry = JobRegistry::new(256, Duration::from_millis(0));
        let id = registry.create(job());
        registry.update(id, false, |j| j.status = JobStatus::Completed);
        registry.sweep_retention();
        assert!(registry.get_all_active().is_empty());
        assert_eq!(registry.get_completed_history().len(), 1);
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn history_ring_is_bounded() {
        let registry = JobRegistry::new(2, Duration::from_millis(0));
        for _ in 0..3 {
            let id = registry.create(job());
            registry.update(id, false, |j| j.status = JobStatus::Completed);
        }
        registry.sweep_retention();
        assert_eq!(registry.get_completed_history().len(), 2);
    }
}
