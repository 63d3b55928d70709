//! Review thread lifecycle: fetch, reconstruct, classify, plan and act.

pub mod actions;
pub mod analysis;
pub mod dedup;
pub mod fetcher;
pub mod planner;

pub use actions::{ActionReport, ThreadActions};
pub use analysis::{ThreadAnalysis, analyze, analyze_fetched};
pub use dedup::{ThreadIndex, dedupe};
pub use fetcher::ThreadFetcher;
pub use planner::{ThreadPlan, plan};
