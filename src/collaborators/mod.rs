//! Narrow trait interfaces standing in for everything §1 scopes out as an
//! external collaborator. The core depends on these traits, never on a
//! concrete implementation — wiring real adapters (Prowlarr, Zurg, a debrid
//! provider, ffprobe, an OpenSubtitles client, TMDB, the user/session
//! database) is left to the deployment.

pub mod debrid;
pub mod directory;
pub mod enrichment;
pub mod media;
pub mod search;

pub use debrid::{DebridClient, DebridStatus, FakeDebridClient};
pub use directory::{FakeLiveTvCatalog, FakeUserDirectory, LiveTvCatalog, UserDirectory, UserProfile};
pub use enrichment::{FakeMetadataProvider, FakeSubtitleProvider, MetadataProvider, SubtitleProvider};
pub use media::{FakeProber, FakeRemuxer, ProbeResult, Prober, RemuxPlan, Remuxer};
pub use search::{FakeIndexer, FakeZurg, IndexerSearch, ZurgCatalog};
