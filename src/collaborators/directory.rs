//! Persisted state the core consumes but does not own (§6): per-user debrid
//! key / bandwidth / parent mapping, and the live-TV channel catalog.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub debrid_key: String,
    pub bandwidth_mbps: Option<f64>,
    pub bandwidth_measured_at: Option<DateTime<Utc>>,
    /// Parent user id, if this is a sub-account; sub-accounts arbitrate on
    /// the parent's debrid key (§4.6).
    pub parent_user_id: Option<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> anyhow::Result<UserProfile>;

    /// The debrid key used for session arbitration: the user's own key, or
    /// the parent's if this is a sub-account.
    async fn arbitration_key(&self, user_id: &str) -> anyhow::Result<String> {
        let profile = self.profile(user_id).await?;
        match profile.parent_user_id {
            Some(parent) => {
                let parent_profile = self.profile(&parent).await?;
                Ok(parent_profile.debrid_key)
            }
            None => Ok(profile.debrid_key),
        }
    }
}

#[async_trait]
pub trait LiveTvCatalog: Send + Sync {
    /// Ordered source URLs for a channel, highest-priority first.
    async fn source_urls(&self, channel_id: &str) -> anyhow::Result<Vec<String>>;
}

pub struct FakeUserDirectory {
    pub profiles: RwLock<HashMap<String, UserProfile>>,
}

impl FakeUserDirectory {
    pub fn new(profiles: HashMap<String, UserProfile>) -> Self {
        FakeUserDirectory {
            profiles: RwLock::new(profiles),
        }
    }
}

#[async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn profile(&self, user_id: &str) -> anyhow::Result<UserProfile> {
        self.profiles
            .read()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown user {user_id}"))
    }
}

pub struct FakeLiveTvCatalog {
    pub channels: HashMap<String, Vec<String>>,
}

#[async_trait]
impl LiveTvCatalog for FakeLiveTvCatalog {
    async fn source_urls(&self, channel_id: &str) -> anyhow::Result<Vec<String>> {
        self.channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown channel {channel_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sub_account_arbitrates_on_parent_debrid_key() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "parent".to_string(),
            UserProfile {
                debrid_key: "parent-key".to_string(),
                bandwidth_mbps: None,
                bandwidth_measured_at: None,
                parent_user_id: None,
            },
        );
        profiles.insert(
            "child".to_string(),
            UserProfile {
                debrid_key: "child-own-key-unused".to_string(),
                bandwidth_mbps: None,
                bandwidth_measured_at: None,
                parent_user_id: Some("parent".to_string()),
            },
        );
        let dir = FakeUserDirectory::new(profiles);
        assert_eq!(dir.arbitration_key("child").await.unwrap(), "parent-key");
        assert_eq!(dir.arbitration_key("parent").await.unwrap(), "parent-key");
    }
}
