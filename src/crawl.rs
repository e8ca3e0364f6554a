//! The scroll-capture-dedup loop for a single feed.
//!
//! Each iteration captures every item currently in the DOM that has not been seen
//! in this session, then scrolls and waits for more to load. The loop ends when the
//! target count is reached, after `stall_limit` iterations in a row without a new
//! item, or after `max_iterations` no matter what.

use std::collections::HashSet;
use std::path::Path;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactStore, FeedItem};
use crate::config::{DedupPolicy, HarvestConfig};
use crate::surface::FeedSurface;
use crate::{Error, Result, HOVER_TIMEOUT_TIMESTAMP, UNKNOWN_TIMESTAMP};

/// Why an item in the DOM did not become an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither the header link nor a permalink was found in the item.
    MissingDetailLink,
    /// The detail link has no usable `href`.
    EmptyIdentity,
    /// A surface or storage call failed while capturing the item.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Saved(Artifact),
    Duplicate,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    TargetReached,
    /// `stall_limit` consecutive iterations produced nothing new.
    Exhausted,
    IterationCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationProgress {
    pub iteration: usize,
    pub new_items: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub feed_id: String,
    /// In discovery order.
    pub artifacts: Vec<Artifact>,
    pub skipped: Vec<SkipReason>,
    pub iterations: Vec<IterationProgress>,
    pub termination: Termination,
}

impl HarvestReport {
    pub fn paths(&self) -> Vec<&Path> {
        self.artifacts.iter().map(|a| a.path.as_path()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Dedup state for one feed. Never shared between feeds.
#[derive(Debug, Default)]
struct Session {
    seen: HashSet<String>,
    next_index: usize,
    artifacts: Vec<Artifact>,
    skipped: Vec<SkipReason>,
}

pub struct Harvester<'a, S> {
    surface: &'a S,
    config: &'a HarvestConfig,
}

impl<'a, S: FeedSurface> Harvester<'a, S> {
    pub fn new(surface: &'a S, config: &'a HarvestConfig) -> Self {
        Self { surface, config }
    }

    /// Crawls one feed. Per-item problems end up in [`HarvestReport::skipped`];
    /// an `Err` means the feed as a whole failed.
    pub async fn harvest(&self, feed_id: &str) -> Result<HarvestReport> {
        let config = self.config;
        let url = config.feed_url(feed_id);
        info!(feed_id, %url, "loading feed");

        self.surface.navigate(&url, config.navigation_timeout).await?;
        if self
            .surface
            .wait_for_element(&config.selectors.item, config.initial_wait)
            .await?
            .is_none()
        {
            return Err(Error::NoFeedItems {
                feed_id: feed_id.to_string(),
            });
        }
        sleep(config.settle_delay).await;

        let store = ArtifactStore::new(&config.output_root, feed_id);
        let mut session = match config.dedup {
            DedupPolicy::ResetPerRun => Session::default(),
            DedupPolicy::ResumeFromDisk => {
                let (seen, next_index) = store.recover().await?;
                info!(feed_id, known = seen.len(), next_index, "resuming from existing artifacts");
                Session {
                    seen,
                    next_index,
                    ..Default::default()
                }
            }
        };

        let stall_limit = config.stall_limit.max(1);
        let mut stalled = 0;
        let mut iterations = Vec::new();
        let mut termination = Termination::IterationCap;

        for iteration in 0..config.max_iterations {
            let new_items = self.capture_visible(feed_id, &store, &mut session).await?;
            let total = session.artifacts.len();
            iterations.push(IterationProgress {
                iteration,
                new_items,
                total,
            });

            if new_items > 0 {
                stalled = 0;
                info!(feed_id, iteration, new_items, total, "scroll progress");
            } else {
                stalled += 1;
                info!(feed_id, iteration, new_items, total, stalled, stall_limit, "scroll progress");
            }

            if total >= config.target_count {
                info!(feed_id, target = config.target_count, "reached target");
                termination = Termination::TargetReached;
                break;
            }
            if stalled >= stall_limit {
                info!(feed_id, "feed exhausted");
                termination = Termination::Exhausted;
                break;
            }

            self.surface.scroll_viewport(config.scroll_fraction).await?;
            sleep(config.settle_delay).await;
            // Lazily loaded items keep rendering after the scroll settles; the probe result is advisory.
            if !self
                .surface
                .wait_for_count(&config.selectors.item, 1, config.content_probe_timeout)
                .await?
            {
                debug!(feed_id, iteration, "no items in the DOM after scrolling");
            }
        }

        info!(
            feed_id,
            saved = session.artifacts.len(),
            skipped = session.skipped.len(),
            ?termination,
            "finished feed"
        );
        Ok(HarvestReport {
            feed_id: feed_id.to_string(),
            artifacts: session.artifacts,
            skipped: session.skipped,
            iterations,
            termination,
        })
    }

    /// Captures every unseen item in the current DOM window and returns how many were saved.
    async fn capture_visible(
        &self,
        feed_id: &str,
        store: &ArtifactStore,
        session: &mut Session,
    ) -> Result<usize> {
        let nodes = self.surface.query_all(&self.config.selectors.item).await?;
        let mut saved = 0;

        for node in &nodes {
            if session.artifacts.len() >= self.config.target_count {
                break;
            }
            match self.capture_item(node, store, session).await {
                ItemOutcome::Saved(artifact) => {
                    info!(feed_id, index = artifact.index, timestamp = %artifact.timestamp, "saved item");
                    session.artifacts.push(artifact);
                    saved += 1;
                }
                ItemOutcome::Duplicate => {}
                ItemOutcome::Skipped(reason) => {
                    warn!(feed_id, ?reason, "skipping item");
                    session.skipped.push(reason);
                }
            }
        }
        Ok(saved)
    }

    async fn capture_item(
        &self,
        node: &S::Element,
        store: &ArtifactStore,
        session: &mut Session,
    ) -> ItemOutcome {
        match self.try_capture_item(node, store, session).await {
            Ok(outcome) => outcome,
            Err(e) => ItemOutcome::Skipped(SkipReason::Failed(e.to_string())),
        }
    }

    async fn try_capture_item(
        &self,
        node: &S::Element,
        store: &ArtifactStore,
        session: &mut Session,
    ) -> Result<ItemOutcome> {
        let selectors = &self.config.selectors;
        let link = match self.surface.query(node, &selectors.detail_link).await? {
            Some(link) => link,
            None => match self.surface.query(node, &selectors.detail_link_fallback).await? {
                Some(link) => link,
                None => return Ok(ItemOutcome::Skipped(SkipReason::MissingDetailLink)),
            },
        };

        let href = self.surface.attribute(&link, "href").await?.unwrap_or_default();
        let identity = strip_query(&href);
        if identity.is_empty() {
            return Ok(ItemOutcome::Skipped(SkipReason::EmptyIdentity));
        }
        if session.seen.contains(identity) {
            return Ok(ItemOutcome::Duplicate);
        }

        let timestamp = self.resolve_timestamp(&link).await;
        // Park the pointer so the next item's hover starts without a stale tooltip.
        let parked = self.surface.move_pointer(0.0, 0.0).await;
        let timestamp = timestamp?;
        parked?;

        session.seen.insert(identity.to_string());
        let item = FeedItem {
            identity: identity.to_string(),
            resolved_timestamp: timestamp,
            raw_markup: self.surface.outer_html(node).await?,
        };
        let artifact = store.write(session.next_index, &item).await?;
        session.next_index += 1;
        Ok(ItemOutcome::Saved(artifact))
    }

    /// Prefers the link's descriptive label and only hovers for a tooltip when
    /// the label is missing or too short to be a full date.
    async fn resolve_timestamp(&self, link: &S::Element) -> Result<String> {
        if let Some(label) = self.surface.attribute(link, "aria-label").await? {
            if label.chars().count() >= self.config.min_label_len {
                return Ok(label);
            }
        }

        self.surface.scroll_into_view(link).await?;
        self.surface.move_pointer(0.0, 0.0).await?;
        sleep(self.config.pointer_reset_pause).await;
        self.surface.hover(link).await?;

        let tooltip = self
            .surface
            .wait_for_element(&self.config.selectors.tooltip, self.config.tooltip_timeout)
            .await;
        match tooltip {
            // A tooltip can vanish between the wait and the read.
            Ok(Some(tooltip)) => match self.surface.inner_text(&tooltip).await {
                Ok(text) if text.trim().is_empty() => Ok(UNKNOWN_TIMESTAMP.to_string()),
                Ok(text) => Ok(text.trim().to_string()),
                Err(e) => {
                    debug!(error = %e, "tooltip text unreadable");
                    Ok(HOVER_TIMEOUT_TIMESTAMP.to_string())
                }
            },
            Ok(None) => Ok(HOVER_TIMEOUT_TIMESTAMP.to_string()),
            Err(e) => {
                debug!(error = %e, "tooltip wait failed");
                Ok(HOVER_TIMEOUT_TIMESTAMP.to_string())
            }
        }
    }
}

fn strip_query(href: &str) -> &str {
    href.split('?').next().unwrap_or_default()
}
