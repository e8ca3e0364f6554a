//! Incremental harvester for infinite-scroll post feeds.
//!
//! [`crawl::Harvester`] scrolls a [`surface::FeedSurface`] and saves every newly
//! discovered post as an artifact file; [`process::convert_all`] later turns the
//! saved artifacts into one flat table via [`parse::extract`].

pub mod artifact;
pub mod config;
pub mod crawl;
mod error;
mod macros;
pub mod parse;
pub mod process;
pub mod snapshot;
pub mod surface;

pub use config::{DedupPolicy, ExtractConfig, FeedSelectors, HarvestConfig};
pub use crawl::{HarvestReport, Harvester, ItemOutcome, SkipReason, Termination};
pub use error::{Error, Result};
pub use parse::{extract, parse_magnitude, ExtractedRecord};
pub use process::{convert_all, harvest_all, AggregateReport, BatchSummary};
pub use snapshot::SnapshotSurface;
pub use surface::FeedSurface;

pub const UNKNOWN_TIMESTAMP: &str = "Unknown";
/// Recorded when hovering the detail link never produced a tooltip.
pub const HOVER_TIMEOUT_TIMESTAMP: &str = "Hover Timeout";
pub const MISSING_BODY: &str = "N/A";
