//! Daily re-analysis of every favorited event.

mod cadence;
mod daemon;
mod refresh;

pub use cadence::DailyCadence;
pub use daemon::spawn_refresh_daemon;
pub use refresh::{RefreshScheduler, RefreshSummary};
