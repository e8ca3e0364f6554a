//! Run configuration for both the harvester and the extractor.
//!
//! Everything that used to be a tunable constant lives here and is passed
//! explicitly, so tests can shrink delays to zero and point the output at a
//! temporary directory.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.facebook.com";
pub const DEFAULT_OUTPUT_ROOT: &str = "./harvested";
pub const DEFAULT_CSV_PATH: &str = "facebook_harvested_data.csv";

/// How the per-feed `seen` set is initialised at the start of a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Every run starts with an empty `seen` set and indices from 0,
    /// overwriting artifacts that share an index with a previous run.
    #[default]
    ResetPerRun,
    /// Identities and the next index are recovered from artifacts already on disk.
    ResumeFromDisk,
}

/// Structural predicates the crawl loop uses to find things on the feed surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSelectors {
    pub item: String,
    /// Timestamp link in the item header.
    pub detail_link: String,
    /// Any permalink-looking link, tried when the header link is missing.
    pub detail_link_fallback: String,
    pub tooltip: String,
}

impl Default for FeedSelectors {
    fn default() -> Self {
        Self {
            item: r#"div[data-focus="feed_story"]"#.to_string(),
            detail_link: r#"h2 + div a[role="link"], span[id] a[role="link"]"#.to_string(),
            detail_link_fallback: r#"a[href*="/posts/"], a[href*="/permalink/"]"#.to_string(),
            tooltip: r#"[role="tooltip"], .uiContextualLayer"#.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub feeds: Vec<String>,
    pub base_url: String,
    pub output_root: PathBuf,
    pub target_count: usize,
    pub max_iterations: usize,
    pub stall_limit: usize,
    /// Fixed pause after every scroll so lazily loaded items can render.
    pub settle_delay: Duration,
    /// Fraction of the viewport height scrolled per iteration.
    pub scroll_fraction: f64,
    pub content_probe_timeout: Duration,
    pub navigation_timeout: Duration,
    pub initial_wait: Duration,
    pub tooltip_timeout: Duration,
    pub pointer_reset_pause: Duration,
    /// A link label needs at least this many characters to count as a full timestamp.
    pub min_label_len: usize,
    pub dedup: DedupPolicy,
    pub selectors: FeedSelectors,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            target_count: 15,
            max_iterations: 50,
            stall_limit: 6,
            settle_delay: Duration::from_secs(3),
            scroll_fraction: 0.5,
            content_probe_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            initial_wait: Duration::from_secs(15),
            tooltip_timeout: Duration::from_secs(2),
            pointer_reset_pause: Duration::from_millis(200),
            min_label_len: 12,
            dedup: DedupPolicy::ResetPerRun,
            selectors: FeedSelectors::default(),
        }
    }
}

impl HarvestConfig {
    pub fn feed_url(&self, feed_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), feed_id)
    }

    pub fn feed_dir(&self, feed_id: &str) -> PathBuf {
        self.output_root.join(feed_id)
    }

    /// Same limits, but without any real-time waiting. Handy for replays and tests.
    pub fn without_delays(mut self) -> Self {
        self.settle_delay = Duration::ZERO;
        self.content_probe_timeout = Duration::ZERO;
        self.initial_wait = Duration::ZERO;
        self.tooltip_timeout = Duration::ZERO;
        self.pointer_reset_pause = Duration::ZERO;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub input_root: PathBuf,
    pub output_path: PathBuf,
    /// Emit an extra `Identity` column recovered from the artifact marker.
    pub include_identity: bool,
    /// Prefix the table with a UTF-8 byte order mark so spreadsheet tools detect the encoding.
    pub write_bom: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            output_path: PathBuf::from(DEFAULT_CSV_PATH),
            include_identity: false,
            write_bom: true,
        }
    }
}
