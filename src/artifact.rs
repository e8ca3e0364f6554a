//! On-disk layout of harvested items.
//!
//! Every discovered item becomes one file, `<output_root>/<feed_id>/[<index>].html`.
//! The first line is a hidden marker span carrying the resolved timestamp (and the
//! item identity), followed by the item's outer markup exactly as captured.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scraper::Html;
use tracing::debug;

use crate::parse::create_selector;
use crate::Result;

pub const ARTIFACT_EXT: &str = "html";
pub const MARKER_CLASS: &str = "custom-timestamp";
pub const IDENTITY_ATTR: &str = "data-identity";

/// An item as captured from the feed surface, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Detail-link path without its query string; unique within one crawl session.
    pub identity: String,
    pub resolved_timestamp: String,
    pub raw_markup: String,
}

/// A persisted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub index: usize,
    pub identity: String,
    pub timestamp: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_root: &Path, feed_id: &str) -> Self {
        Self {
            dir: output_root.join(feed_id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("[{index}].{ARTIFACT_EXT}"))
    }

    /// Writes the marker line followed by the raw markup.
    pub async fn write(&self, index: usize, item: &FeedItem) -> Result<Artifact> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(index);
        let content = format!(
            "{}\n{}",
            render_marker(&item.identity, &item.resolved_timestamp),
            item.raw_markup
        );
        tokio::fs::write(&path, content).await?;
        Ok(Artifact {
            index,
            identity: item.identity.clone(),
            timestamp: item.resolved_timestamp.clone(),
            path,
        })
    }

    /// Identities already captured in this feed directory plus the next free index.
    pub async fn recover(&self) -> Result<(HashSet<String>, usize)> {
        let mut seen = HashSet::new();
        let mut next_index = 0;
        for (index, path) in list_indexed(&self.dir).await? {
            next_index = next_index.max(index + 1);
            let content = tokio::fs::read_to_string(&path).await?;
            let marker_line = content.lines().next().unwrap_or_default();
            match marker_identity(marker_line)? {
                Some(identity) => {
                    seen.insert(identity);
                }
                None => debug!(path = %path.display(), "artifact has no identity in its marker"),
            }
        }
        Ok((seen, next_index))
    }
}

pub fn render_marker(identity: &str, timestamp: &str) -> String {
    // The marker has to stay on the first line.
    let timestamp = timestamp.replace(['\r', '\n'], " ");
    format!(
        r#"<span class="{MARKER_CLASS}" {IDENTITY_ATTR}="{}" style="display:none">{}</span>"#,
        html_escape(identity),
        html_escape(&timestamp)
    )
}

fn marker_identity(marker_line: &str) -> Result<Option<String>> {
    let selector = create_selector(&format!("span.{MARKER_CLASS}"))?;
    let fragment = Html::parse_fragment(marker_line);
    let identity = fragment
        .select(&selector)
        .next()
        .and_then(|span| span.value().attr(IDENTITY_ATTR))
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    Ok(identity)
}

/// `[12].html` -> `Some(12)`.
pub fn parse_index(file_name: &str) -> Option<usize> {
    file_name
        .strip_suffix(ARTIFACT_EXT)?
        .strip_suffix('.')?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Lists the artifacts in `dir` ordered by their numeric index, so `[10]` comes after `[2]`.
/// A missing directory is treated as empty.
pub async fn list_indexed(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut indexed = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        match parse_index(&file_name) {
            Some(index) => indexed.push((index, entry.path())),
            None => debug!(file = %file_name, "skipping non-artifact file"),
        }
    }
    indexed.sort_unstable_by_key(|(index, _)| *index);
    Ok(indexed)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
