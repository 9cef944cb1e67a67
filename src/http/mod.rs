pub mod dto;
pub mod livetv;
pub mod routes;
pub mod state;
pub mod vod;

pub use routes::create_router;
pub use state::AppState;
