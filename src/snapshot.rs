//! Offline [`FeedSurface`] that replays captured HTML frames.
//!
//! A feed is a directory of frames, `<root>/<feed_id>/0.html`, `1.html`, ...,
//! each holding the page as it looked after that many scrolls. Scrolling
//! advances to the next frame and stays on the last one once the capture runs out.
//! Frames never change while waiting, so every wait resolves immediately.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::parse::create_selector;
use crate::surface::FeedSurface;
use crate::{Error, Result};

/// Element handle: the element's outer markup at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotElement {
    html: String,
}

impl SnapshotElement {
    pub fn html(&self) -> &str {
        &self.html
    }
}

#[derive(Debug, Default)]
struct Replay {
    frames: Vec<String>,
    position: usize,
}

#[derive(Debug)]
pub struct SnapshotSurface {
    root: PathBuf,
    replay: Mutex<Replay>,
    hovers: AtomicUsize,
}

impl SnapshotSurface {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            replay: Mutex::new(Replay::default()),
            hovers: AtomicUsize::new(0),
        }
    }

    /// How many times an element has been hovered since creation.
    pub fn hover_count(&self) -> usize {
        self.hovers.load(Ordering::Relaxed)
    }

    fn current_frame(&self) -> Result<String> {
        let replay = self
            .replay
            .lock()
            .map_err(|_| Error::Surface("snapshot replay lock poisoned".into()))?;
        Ok(replay.frames.get(replay.position).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl FeedSurface for SnapshotSurface {
    type Element = SnapshotElement;

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        let feed_id = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let frames = load_frames(&self.root.join(feed_id))
            .await
            .map_err(|e| Error::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!(feed_id, frames = frames.len(), "loaded snapshot frames");

        let mut replay = self
            .replay
            .lock()
            .map_err(|_| Error::Surface("snapshot replay lock poisoned".into()))?;
        *replay = Replay {
            frames,
            position: 0,
        };
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<SnapshotElement>> {
        let frame = self.current_frame()?;
        select_all(&Html::parse_document(&frame), selector)
    }

    async fn query(
        &self,
        scope: &SnapshotElement,
        selector: &str,
    ) -> Result<Option<SnapshotElement>> {
        let fragment = Html::parse_fragment(&scope.html);
        Ok(select_all(&fragment, selector)?.into_iter().next())
    }

    async fn attribute(&self, element: &SnapshotElement, name: &str) -> Result<Option<String>> {
        let fragment = Html::parse_fragment(&element.html);
        Ok(top_element(&fragment).and_then(|el| el.value().attr(name).map(str::to_string)))
    }

    async fn inner_text(&self, element: &SnapshotElement) -> Result<String> {
        let fragment = Html::parse_fragment(&element.html);
        Ok(top_element(&fragment)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default())
    }

    async fn outer_html(&self, element: &SnapshotElement) -> Result<String> {
        Ok(element.html.clone())
    }

    async fn scroll_into_view(&self, _element: &SnapshotElement) -> Result<()> {
        Ok(())
    }

    async fn hover(&self, _element: &SnapshotElement) -> Result<()> {
        self.hovers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn move_pointer(&self, _x: f64, _y: f64) -> Result<()> {
        Ok(())
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<SnapshotElement>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn wait_for_count(
        &self,
        selector: &str,
        min_count: usize,
        _timeout: Duration,
    ) -> Result<bool> {
        Ok(self.query_all(selector).await?.len() >= min_count)
    }

    async fn scroll_viewport(&self, _fraction: f64) -> Result<()> {
        let mut replay = self
            .replay
            .lock()
            .map_err(|_| Error::Surface("snapshot replay lock poisoned".into()))?;
        if replay.position + 1 < replay.frames.len() {
            replay.position += 1;
        }
        Ok(())
    }
}

fn select_all(doc: &Html, selector: &str) -> Result<Vec<SnapshotElement>> {
    let selector = create_selector(selector)?;
    Ok(doc
        .select(&selector)
        .map(|el| SnapshotElement { html: el.html() })
        .collect())
}

/// `parse_fragment` wraps its input in an `<html>` root; this is the first real element.
fn top_element(fragment: &Html) -> Option<ElementRef<'_>> {
    fragment.root_element().children().find_map(ElementRef::wrap)
}

/// Frames are the `N.html` files of `dir`, in numeric order.
async fn load_frames(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut numbered = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let frame_num = path
            .file_stem()
            .filter(|_| path.extension().is_some_and(|ext| ext == "html"))
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok());
        if let Some(n) = frame_num {
            numbered.push((n, path));
        }
    }
    numbered.sort_unstable_by_key(|(n, _)| *n);

    let mut frames = Vec::with_capacity(numbered.len());
    for (_, path) in numbered {
        frames.push(tokio::fs::read_to_string(path).await?);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn surface_with(frames: &[&str]) -> (tempfile::TempDir, SnapshotSurface) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("feed");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for (n, frame) in frames.iter().enumerate() {
            tokio::fs::write(dir.join(format!("{n}.html")), frame)
                .await
                .unwrap();
        }
        let surface = SnapshotSurface::new(tmp.path());
        surface
            .navigate("https://example.com/feed", Duration::ZERO)
            .await
            .unwrap();
        (tmp, surface)
    }

    #[tokio::test]
    async fn scrolling_advances_and_saturates() {
        let (_tmp, surface) =
            surface_with(&["<div class=i>a</div>", "<div class=i>a</div><div class=i>b</div>"])
                .await;
        assert_eq!(surface.query_all("div.i").await.unwrap().len(), 1);
        surface.scroll_viewport(0.5).await.unwrap();
        assert_eq!(surface.query_all("div.i").await.unwrap().len(), 2);
        surface.scroll_viewport(0.5).await.unwrap();
        assert_eq!(surface.query_all("div.i").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn element_queries_work_on_captured_markup() {
        let (_tmp, surface) = surface_with(&[
            r#"<div class="i"><a role="link" href="/p/posts/9?x=1" aria-label="yesterday"> 1h </a></div>"#,
        ])
        .await;
        let item = surface.query_all("div.i").await.unwrap().remove(0);
        let link = surface.query(&item, "a").await.unwrap().unwrap();
        assert_eq!(
            surface.attribute(&link, "href").await.unwrap().as_deref(),
            Some("/p/posts/9?x=1")
        );
        assert_eq!(surface.inner_text(&link).await.unwrap(), "1h");
        assert_eq!(surface.attribute(&link, "title").await.unwrap(), None);
    }

    #[tokio::test]
    async fn navigating_to_unknown_feed_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let surface = SnapshotSurface::new(tmp.path());
        let err = surface
            .navigate("https://example.com/missing", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation { .. }));
    }
}
