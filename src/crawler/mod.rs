//! Staged crawl pipeline
//!
//! Fetching, link extraction, and the orchestrator that drives both against
//! the queue under the throttling layer's supervision.

mod fetcher;
mod orchestrator;
mod parser;

pub use fetcher::{build_identity_client, fetch_page, FetchOutcome};
pub use orchestrator::{KindCompleteness, Orchestrator, PipelineReport, StageReport};
pub use parser::{DiscoveredLink, DocumentParser, HrefScanParser, ParseOutcome};
