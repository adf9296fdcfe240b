pub mod espn;
pub mod filter;
pub mod models;
pub mod provider;

pub use espn::EspnScoreboard;
pub use filter::filter_live;
pub use models::{ScoreEvent, SportConfig};
pub use provider::{fetch_all, FetchOutcome, UpstreamFetcher};
