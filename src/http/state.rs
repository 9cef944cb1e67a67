//! Shared application state (§10.5): everything handlers need, built once in
//! `main` and cloned cheaply (every field is an `Arc`) into each request.

use std::sync::Arc;

use crate::cache::LinkCache;
use crate::collaborators::UserDirectory;
use crate::job::engine::JobEngine;
use crate::job::registry::JobRegistry;
use crate::livetv::LiveTvProxy;
use crate::prefetch::Prefetcher;
use crate::rangeproxy::RangeProxy;
use crate::session::SessionArbiter;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JobEngine>,
    pub registry: Arc<JobRegistry>,
    pub link_cache: Arc<LinkCache>,
    pub sessions: Arc<SessionArbiter>,
    pub livetv: Arc<LiveTvProxy>,
    pub rangeproxy: Arc<RangeProxy>,
    pub prefetcher: Arc<Prefetcher>,
    pub users: Arc<dyn UserDirectory>,
}
