use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use vodcore::cache::{LinkCache, ReqwestLivenessProbe};
use vodcore::collaborators::{FakeDebridClient, FakeIndexer, FakeLiveTvCatalog, FakeMetadataProvider, FakeProber, FakeRemuxer, FakeSubtitleProvider, FakeUserDirectory, FakeZurg};
use vodcore::config::Config;
use vodcore::enrich::BackgroundEnrichers;
use vodcore::http::{create_router, AppState};
use vodcore::housekeeping::Housekeeping;
use vodcore::job::engine::JobEngine;
use vodcore::job::registry::JobRegistry;
use vodcore::livetv::LiveTvProxy;
use vodcore::logging;
use vodcore::prefetch::Prefetcher;
use vodcore::rangeproxy::RangeProxy;
use vodcore::resolver::SourceResolver;
use vodcore::session::SessionArbiter;
use vodcore::validator::Validator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = Config::load()?;
    tracing::info!(?config.server, "configuration loaded");

    // Out-of-scope collaborators (auth, TMDB, Prowlarr, debrid, Zurg, ffprobe,
    // OpenSubtitles, the user/session database) are wired as fakes here; a
    // real deployment swaps these for network-backed adapters (§1).
    let registry = Arc::new(JobRegistry::new(config.registry.history_capacity, Duration::from_secs(config.registry.retention_secs)));
    let link_cache = Arc::new(LinkCache::new(
        Duration::from_secs(config.link_cache.ttl_secs),
        Box::new(ReqwestLivenessProbe::default()),
    ));
    let sessions = Arc::new(SessionArbiter::new(
        Duration::from_secs(config.timeouts.session_grace_secs),
        Duration::from_secs(config.timeouts.session_check_deadline_secs),
        Duration::from_secs(config.timeouts.session_idle_timeout_secs),
    ));

    let zurg = Arc::new(FakeZurg {
        results: vec![],
        direct_urls: HashMap::new(),
    });
    let indexer = Arc::new(FakeIndexer { results: vec![] });
    let resolver = Arc::new(SourceResolver::new(zurg.clone(), indexer));
    let prober = Arc::new(FakeProber {
        result: vodcore::collaborators::media::ProbeResult {
            video_codec: "h264".to_string(),
            audio_streams: vec![],
            subtitle_streams: vec![],
            has_chapters: false,
            duration_secs: 0.0,
            probe_time_ms: 0,
            timed_out: false,
            container_is_matroska_like: false,
        },
    });
    let validator = Arc::new(Validator::new(prober, config.validator.clone()));
    let debrid = Arc::new(FakeDebridClient::new(vec![]));
    let remuxer = Arc::new(FakeRemuxer {
        output_path: "/tmp/vodcore-remux-output.mp4".to_string(),
        should_fail: false,
    });
    let metadata = Arc::new(FakeMetadataProvider { next: None, markers: None });
    let subtitle_provider = Arc::new(FakeSubtitleProvider {
        cached_path: None,
        fetched_path: None,
    });
    let enrichers = Arc::new(BackgroundEnrichers::new(registry.clone(), metadata.clone(), subtitle_provider));

    let engine = Arc::new(JobEngine::new(
        registry.clone(),
        link_cache.clone(),
        resolver,
        validator,
        debrid,
        zurg,
        remuxer,
        "/vod/stream".to_string(),
        "/vod/stream-processed".to_string(),
        config.timeouts.clone(),
        enrichers,
    ));
    let prefetcher = Arc::new(Prefetcher::new(engine.clone(), registry.clone(), metadata));
    let users = Arc::new(FakeUserDirectory::new(HashMap::new()));
    let livetv = Arc::new(LiveTvProxy::new(
        Arc::new(FakeLiveTvCatalog { channels: HashMap::new() }),
        config.livetv.proxy_base.clone(),
        config.timeouts.segment_fail_threshold,
    ));
    let rangeproxy = Arc::new(RangeProxy::new(
        std::path::PathBuf::from("/mnt/zurg"),
        Duration::from_secs(config.timeouts.fs_stat_timeout_secs),
    ));

    let _scheduler = Housekeeping::new(registry.clone(), link_cache.clone(), sessions.clone())
        .spawn()
        .await?;

    let state = AppState {
        engine,
        registry,
        link_cache,
        sessions,
        livetv,
        rangeproxy,
        prefetcher,
        users,
    };

    let router = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "vodcore listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
