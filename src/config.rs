//! Layered configuration: built-in defaults, optional file, then environment.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    pub dead_torrent_timeout_secs: u64,
    pub slow_start_timeout_secs: u64,
    pub active_start_timeout_secs: u64,
    pub stall_timeout_secs: u64,
    pub job_max_duration_secs: u64,
    pub first_sources_wait_secs: u64,
    pub first_sources_slow_wait_secs: u64,
    pub session_grace_secs: u64,
    pub session_check_deadline_secs: u64,
    pub session_idle_timeout_secs: u64,
    pub segment_fail_threshold: u32,
    pub fs_stat_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub history_capacity: usize,
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkCacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub accepted_video_codecs: Vec<String>,
    pub accepted_audio_codecs: Vec<String>,
    pub audio_transcode_target: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveTvConfig {
    pub proxy_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutsConfig,
    pub registry: RegistryConfig,
    pub link_cache: LinkCacheConfig,
    pub validator: ValidatorConfig,
    pub livetv: LiveTvConfig,
}

impl Config {
    /// Loads defaults, then an optional file named by `VODCORE_CONFIG`, then
    /// `VODCORE__`-prefixed environment variables (double underscore nests).
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::defaults())?);

        if let Ok(path) = std::env::var("VODCORE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VODCORE")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    fn defaults() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            timeouts: TimeoutsConfig {
                dead_torrent_timeout_secs: 10,
                slow_start_timeout_secs: 12,
                active_start_timeout_secs: 30,
                stall_timeout_secs: 60,
                job_max_duration_secs: 300,
                first_sources_wait_secs: 15,
                first_sources_slow_wait_secs: 35,
                session_grace_secs: 5,
                session_check_deadline_secs: 8,
                session_idle_timeout_secs: 90,
                segment_fail_threshold: 3,
                fs_stat_timeout_secs: 10,
            },
            registry: RegistryConfig {
                history_capacity: 256,
                retention_secs: 30,
            },
            link_cache: LinkCacheConfig { ttl_secs: 24 * 3600 },
            validator: ValidatorConfig {
                accepted_video_codecs: vec!["h264", "hevc", "av1", "vp9"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                accepted_audio_codecs: vec!["aac", "ac3", "eac3", "mp3"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                audio_transcode_target: "aac".to_string(),
            },
            livetv: LiveTvConfig {
                proxy_base: "/livetv/stream".to_string(),
            },
        }
    }
}
