//! SessionArbiter (§4.6): one active playback session per debrid key.
//! `Check` is on the hot path for every stream request and must stay cheap —
//! no collaborator calls, no locking beyond a single `dashmap` shard.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;

use crate::error::AppError;
use crate::model::DebridSession;

pub enum CheckOutcome {
    Admitted,
    Denied { active_user: String, started_at_ms: i64 },
}

pub struct SessionArbiter {
    sessions: DashMap<String, DebridSession>,
    /// Keys pending removal after `End`, with the instant the grace period expires.
    pending_end: DashMap<String, Instant>,
    grace: Duration,
    check_deadline: Duration,
    idle_timeout: chrono::Duration,
}

impl SessionArbiter {
    pub fn new(grace: Duration, check_deadline: Duration, idle_timeout: Duration) -> Self {
        SessionArbiter {
            sessions: DashMap::new(),
            pending_end: DashMap::new(),
            grace,
            check_deadline,
            idle_timeout: chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::zero()),
        }
    }

    /// Admits a new session for `debrid_key`/`ip`, replacing any expired or
    /// pending-end entry, or denies if a different ip already holds a live
    /// session. Wrapped in `tokio::time::timeout` by the caller against the
    /// 8 s server-side deadline (§4.6); the body itself never awaits.
    pub async fn check(&self, debrid_key: &str, ip: &str, user_id: &str, username: &str) -> Result<CheckOutcome, AppError> {
        tokio::time::timeout(self.check_deadline, async { self.check_inner(debrid_key, ip, user_id, username) })
            .await
            .map_err(|_| AppError::SessionTimeout)
    }

    fn check_inner(&self, debrid_key: &str, ip: &str, user_id: &str, username: &str) -> CheckOutcome {
        self.pending_end.remove(debrid_key);

        if let Some(existing) = self.sessions.get(debrid_key) {
            if existing.ip_address == ip {
                drop(existing);
                self.touch(debrid_key, ip, user_id, username);
                return CheckOutcome::Admitted;
            }
            // §3/§4.6: a session with no heartbeat within the idle window has
            // expired and is replaceable by any ip, not just the original one.
            if Utc::now() - existing.last_heartbeat_at > self.idle_timeout {
                drop(existing);
                self.touch(debrid_key, ip, user_id, username);
                return CheckOutcome::Admitted;
            }
            return CheckOutcome::Denied {
                active_user: existing.username.clone(),
                started_at_ms: existing.started_at.timestamp_millis(),
            };
        }

        self.touch(debrid_key, ip, user_id, username);
        CheckOutcome::Admitted
    }

    fn touch(&self, debrid_key: &str, ip: &str, user_id: &str, username: &str) {
        let now = Utc::now();
        self.sessions
            .entry(debrid_key.to_string())
            .and_modify(|s| s.last_heartbeat_at = now)
            .or_insert(DebridSession {
                debrid_key: debrid_key.to_string(),
                ip_address: ip.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                started_at: now,
                last_heartbeat_at: now,
            });
    }

    pub fn heartbeat(&self, debrid_key: &str, ip: &str) {
        if let Some(mut session) = self.sessions.get_mut(debrid_key) {
            if session.ip_address == ip {
                session.last_heartbeat_at = Utc::now();
            }
        }
    }

    /// Marks the session for removal after the grace period rather than
    /// dropping it immediately, so a rapid reconnect from the same ip is
    /// tolerated without a spurious deny.
    pub fn end(&self, debrid_key: &str, ip: &str) {
        let should_schedule = self
            .sessions
            .get(debrid_key)
            .map(|s| s.ip_address == ip)
            .unwrap_or(false);
        if should_schedule {
            self.pending_end.insert(debrid_key.to_string(), Instant::now() + self.grace);
        }
    }

    /// Called by the periodic housekeeping sweep: removes sessions whose
    /// grace period has elapsed.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending_end
            .iter()
            .filter(|e| now >= *e.value())
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.pending_end.remove(&key);
            self.sessions.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> SessionArbiter {
        SessionArbiter::new(Duration::from_millis(50), Duration::from_secs(8), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn first_check_admits() {
        let a = arbiter();
        let outcome = a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Admitted));
    }

    #[tokio::test]
    async fn same_ip_reentry_is_admitted() {
        let a = arbiter();
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        let outcome = a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Admitted));
    }

    #[tokio::test]
    async fn different_ip_is_denied_while_session_is_live() {
        let a = arbiter();
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        let outcome = a.check("key1", "5.6.7.8", "u2", "bob").await.unwrap();
        match outcome {
            CheckOutcome::Denied { active_user, .. } => assert_eq!(active_user, "alice"),
            CheckOutcome::Admitted => panic!("expected a deny"),
        }
    }

    #[tokio::test]
    async fn end_followed_by_rapid_reconnect_from_same_ip_is_tolerated() {
        let a = arbiter();
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        a.end("key1", "1.2.3.4");
        let outcome = a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Admitted));
    }

    #[tokio::test]
    async fn sweep_expired_frees_the_key_for_a_different_ip() {
        let a = arbiter();
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        a.end("key1", "1.2.3.4");
        tokio::time::sleep(Duration::from_millis(60)).await;
        a.sweep_expired();
        let outcome = a.check("key1", "5.6.7.8", "u2", "bob").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Admitted));
    }

    #[tokio::test]
    async fn a_session_with_no_heartbeat_within_the_idle_window_is_replaced_by_a_different_ip() {
        let a = SessionArbiter::new(Duration::from_millis(50), Duration::from_secs(8), Duration::from_millis(30));
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let outcome = a.check("key1", "5.6.7.8", "u2", "bob").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Admitted));
    }

    #[tokio::test]
    async fn a_heartbeat_within_the_idle_window_keeps_the_session_live_for_a_different_ip() {
        let a = SessionArbiter::new(Duration::from_millis(50), Duration::from_secs(8), Duration::from_millis(200));
        a.check("key1", "1.2.3.4", "u1", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        a.heartbeat("key1", "1.2.3.4");
        let outcome = a.check("key1", "5.6.7.8", "u2", "bob").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn sub_accounts_share_the_parent_key_and_arbitrate_normally() {
        // Arbitration is keyed purely on debrid_key; callers resolve the
        // sub-account → parent mapping via UserDirectory::arbitration_key
        // before calling Check (§4.6).
        let a = arbiter();
        a.check("parent-key", "1.2.3.4", "child-1", "kid1").await.unwrap();
        let outcome = a.check("parent-key", "5.6.7.8", "child-2", "kid2").await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Denied { .. }));
    }
}
