use std::path::PathBuf;

use chrono::Local;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::artifact::list_indexed;
use crate::config::{ExtractConfig, HarvestConfig};
use crate::crawl::Harvester;
use crate::parse::{extract_file, ExtractedRecord};
use crate::surface::FeedSurface;
use crate::{info_time, Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const COLUMNS: [&str; 6] = ["Page", "Timestamp", "Content", "Reactions", "Comments", "Shares"];
const IDENTITY_COLUMN: &str = "Identity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFailure {
    pub feed_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<FeedFailure>,
}

#[derive(Debug, Default)]
pub struct AggregateReport {
    pub rows: usize,
    pub feeds: usize,
    /// Artifacts without an item root, or that could not be read.
    pub skipped_files: usize,
    /// `None` when there was nothing to aggregate and no table was written.
    pub output_path: Option<PathBuf>,
}

/// Harvests every configured feed, one after another, on the same surface.
/// A feed that fails or saves nothing is recorded and the batch moves on.
pub async fn harvest_all<S: FeedSurface>(config: &HarvestConfig, surface: &S) -> BatchSummary {
    let start_time = Local::now();
    let total = config.feeds.len();
    info_time!("Starting bulk harvest, feeds to scrape: {total}");

    let harvester = Harvester::new(surface, config);
    let mut summary = BatchSummary::default();
    for (i, feed_id) in config.feeds.iter().enumerate() {
        info!(%feed_id, "[{}/{total}] harvesting", i + 1);
        let reason = match harvester.harvest(feed_id).await {
            Ok(report) if !report.is_empty() => {
                summary.succeeded.push(feed_id.clone());
                continue;
            }
            Ok(_) => "no items saved".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(%feed_id, %reason, "feed failed");
        summary.failed.push(FeedFailure {
            feed_id: feed_id.clone(),
            reason,
        });
    }

    info_time!(
        start_time,
        "Done! {} succeeded, {} failed",
        summary.succeeded.len(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        let failed: Vec<&str> = summary.failed.iter().map(|f| f.feed_id.as_str()).collect();
        warn!(?failed, "failed feeds");
    }
    summary
}

/// Extracts every artifact under the input root and writes them as one table.
/// Feeds are visited in name order, artifacts in index order.
pub async fn convert_all(config: &ExtractConfig) -> Result<AggregateReport> {
    let start_time = Local::now();
    let mut report = AggregateReport::default();

    let feed_dirs = match feed_dirs(config).await? {
        Some(dirs) => dirs,
        None => {
            warn!(root = %config.input_root.display(), "No harvested data found.");
            return Ok(report);
        }
    };

    let mut records = Vec::new();
    for (feed_id, dir) in feed_dirs {
        info!(%feed_id, "parsing feed");
        report.feeds += 1;
        for (index, path) in list_indexed(&dir).await? {
            match extract_file(&path, &feed_id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    debug!(%feed_id, index, "artifact has no item root");
                    report.skipped_files += 1;
                }
                Err(e) => {
                    warn!(%feed_id, index, error = %e, "could not extract artifact");
                    report.skipped_files += 1;
                }
            }
        }
    }

    let table = render_table(&records, config)?;
    let mut file = File::create(&config.output_path).await?;
    file.write_all(&table).await?;
    file.flush().await?;

    report.rows = records.len();
    report.output_path = Some(config.output_path.clone());
    info_time!(
        start_time,
        "Saved {} posts to {}",
        report.rows,
        config.output_path.display()
    );
    Ok(report)
}

/// Feed directories under the input root sorted by name, or `None` if the root is missing.
async fn feed_dirs(config: &ExtractConfig) -> Result<Option<Vec<(String, PathBuf)>>> {
    let mut entries = match tokio::fs::read_dir(&config.input_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        // Follows symlinks, so a linked feed directory still counts.
        if !tokio::fs::metadata(entry.path()).await?.is_dir() {
            continue;
        }
        let feed_id = entry.file_name().to_string_lossy().into_owned();
        dirs.push((feed_id, entry.path()));
    }
    dirs.sort_unstable();
    Ok(Some(dirs))
}

fn render_table(records: &[ExtractedRecord], config: &ExtractConfig) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if config.write_bom {
        buf.extend_from_slice(UTF8_BOM);
    }

    let mut writer = csv::Writer::from_writer(buf);
    let mut header = COLUMNS.to_vec();
    if config.include_identity {
        header.push(IDENTITY_COLUMN);
    }
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.feed_id.clone(),
            record.timestamp.clone(),
            record.body_text.clone(),
            record.reaction_count.to_string(),
            record.comment_count.to_string(),
            record.share_count.to_string(),
        ];
        if config.include_identity {
            row.push(record.identity.clone().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))
}
