use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio::task::spawn_blocking;

use crate::artifact::{IDENTITY_ATTR, MARKER_CLASS};
use crate::{Error, Result, MISSING_BODY, UNKNOWN_TIMESTAMP};

pub const ITEM_ROOT: &str = r#"div[data-focus="feed_story"]"#;

/// One row of the aggregate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub feed_id: String,
    /// Recovered from the artifact marker; artifacts written by older harvests may lack it.
    pub identity: Option<String>,
    pub timestamp: String,
    pub body_text: String,
    pub reaction_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
}

/// One place a field may live inside an item root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Rendered text of the first element matching the selector.
    Text(&'static str),
    /// Attribute of the first element matching the selector.
    Attr(&'static str, &'static str),
    /// Own text of the first element matching the selector whose own text
    /// contains the needle, ignoring case.
    OwnTextContaining(&'static str, &'static str),
}

// Post types expose the body under different wrappers.
pub const BODY_PROBES: &[Probe] = &[
    Probe::Text(r#"span[data-ad-rendering-role="description"]"#),
    Probe::Text(r#"div[data-ad-comet-preview="message"]"#),
    Probe::Text(r#"div[data-ad-preview="message"]"#),
];

pub const REACTION_PROBES: &[Probe] = &[
    Probe::Text("span.xt0b8zv"),
    Probe::Attr(r#"[aria-label*="reaction"]"#, "aria-label"),
];

pub const COMMENT_PROBES: &[Probe] = &[Probe::OwnTextContaining("span", "comment")];

pub const SHARE_PROBES: &[Probe] = &[Probe::OwnTextContaining("span", "share")];

impl Probe {
    pub fn resolve(&self, root: ElementRef) -> Result<Option<String>> {
        let found = match *self {
            Probe::Text(sel) => {
                let selector = create_selector(sel)?;
                root.select(&selector).next().map(rendered_text)
            }
            Probe::Attr(sel, attr) => {
                let selector = create_selector(sel)?;
                root.select(&selector)
                    .next()
                    .and_then(|el| el.value().attr(attr))
                    .map(str::to_string)
            }
            Probe::OwnTextContaining(sel, needle) => {
                let selector = create_selector(sel)?;
                root.select(&selector)
                    .map(own_text)
                    .find(|text| text.to_lowercase().contains(needle))
            }
        };
        Ok(found)
    }
}

/// Tries each candidate in order and returns the first non-empty, trimmed value.
/// Candidates after the winning one are never evaluated.
pub fn first_non_empty<I, F>(candidates: I) -> Result<Option<String>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Result<Option<String>>,
{
    for candidate in candidates {
        if let Some(text) = candidate()? {
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}

fn probe_field(root: ElementRef, probes: &[Probe]) -> Result<Option<String>> {
    first_non_empty(probes.iter().map(|probe| move || probe.resolve(root)))
}

/// Recovers a record from one artifact's markup.
/// Returns `None` when the markup has no item root.
pub fn extract(markup: &str, feed_id: &str) -> Result<Option<ExtractedRecord>> {
    let doc = Html::parse_document(markup);

    let root_selector = create_selector(ITEM_ROOT)?;
    let Some(root) = doc.select(&root_selector).next() else {
        return Ok(None);
    };

    // The marker sits next to the item root, not inside it.
    let marker_selector = create_selector(&format!("span.{MARKER_CLASS}"))?;
    let marker = doc.select(&marker_selector).next();
    let timestamp = marker
        .map(rendered_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string());
    let identity = marker
        .and_then(|m| m.value().attr(IDENTITY_ATTR))
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let body_text =
        probe_field(root, BODY_PROBES)?.unwrap_or_else(|| MISSING_BODY.to_string());
    let count = |probes: &[Probe]| -> Result<u64> {
        Ok(probe_field(root, probes)?
            .map(|text| parse_magnitude(&text))
            .unwrap_or(0))
    };

    Ok(Some(ExtractedRecord {
        feed_id: feed_id.to_string(),
        identity,
        timestamp,
        body_text,
        reaction_count: count(REACTION_PROBES)?,
        comment_count: count(COMMENT_PROBES)?,
        share_count: count(SHARE_PROBES)?,
    }))
}

/// Reads and extracts one artifact file. Parsing runs on the blocking pool.
pub async fn extract_file(path: &Path, feed_id: &str) -> Result<Option<ExtractedRecord>> {
    let markup = tokio::fs::read_to_string(path).await?;
    let feed_id = feed_id.to_string();
    spawn_blocking(move || extract(&markup, &feed_id)).await?
}

static MAGNITUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.?\d*)([KMB]?)").expect("magnitude pattern is valid")
});

/// Turns human counters such as `"18K"`, `"2.5K"` or `"1,234"` into integers.
/// Anything without a number in it is `0`.
pub fn parse_magnitude(text: &str) -> u64 {
    let text = text.to_uppercase().replace(',', "");
    let Some(caps) = MAGNITUDE.captures(text.trim()) else {
        return 0;
    };
    let Ok(number) = caps[1].parse::<f64>() else {
        return 0;
    };
    let multiplier = match &caps[2] {
        "K" => 1e3,
        "M" => 1e6,
        "B" => 1e9,
        _ => 1.0,
    };
    // `as` truncates toward zero.
    (number * multiplier) as u64
}

#[inline]
pub(crate) fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::InvalidSelector(sel_str.into()))
}

/// Text of the element and all its descendants with whitespace runs collapsed.
fn rendered_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn own_text(el: ElementRef) -> String {
    el.children()
        .filter_map(|child| child.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
