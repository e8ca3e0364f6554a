#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use feedharvest::{Error, FeedSurface, HarvestConfig, Result};

pub const LONG_LABEL: &str = "Monday, 3 March 2025 at 10:00";

/// A feed post whose header link carries `label` as its `aria-label`.
pub fn post(id: &str, label: Option<&str>) -> String {
    let label = label
        .map(|l| format!(r#" aria-label="{l}""#))
        .unwrap_or_default();
    format!(
        r#"<div data-focus="feed_story"><h2>Page</h2><div><a role="link" href="/page/posts/{id}?__cft__=xyz"{label}>1h</a></div><div data-ad-preview="message">Post {id}</div><span class="xt0b8zv">1.5K</span><span>4 comments</span></div>"#
    )
}

/// A post with no link to its detail view.
pub fn linkless_post() -> String {
    r#"<div data-focus="feed_story"><div data-ad-preview="message">orphan</div></div>"#.to_string()
}

pub fn frame(posts: &[String]) -> String {
    format!("<html><body><main>{}</main></body></html>", posts.concat())
}

pub fn labelled(ids: &[&str]) -> String {
    frame(
        &ids.iter()
            .map(|id| post(id, Some(LONG_LABEL)))
            .collect::<Vec<_>>(),
    )
}

/// Writes `frames` as `<root>/<feed_id>/<n>.html`.
pub fn write_frames(root: &Path, feed_id: &str, frames: &[String]) {
    let dir = root.join(feed_id);
    std::fs::create_dir_all(&dir).unwrap();
    for (n, frame) in frames.iter().enumerate() {
        std::fs::write(dir.join(format!("{n}.html")), frame).unwrap();
    }
}

pub fn config(output_root: PathBuf, feeds: &[&str]) -> HarvestConfig {
    HarvestConfig {
        feeds: feeds.iter().map(|f| f.to_string()).collect(),
        base_url: "https://feeds.example".to_string(),
        output_root,
        target_count: 100,
        max_iterations: 50,
        stall_limit: 2,
        ..Default::default()
    }
    .without_delays()
}

/// One post as the scripted surface presents it.
#[derive(Debug, Clone)]
pub struct ScriptedPost {
    pub id: String,
    pub has_link: bool,
    pub label: Option<String>,
}

impl ScriptedPost {
    pub fn unlabelled(id: &str) -> Self {
        Self {
            id: id.to_string(),
            has_link: true,
            label: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedElement {
    Post(ScriptedPost),
    Link(ScriptedPost),
    Tooltip,
}

/// In-memory surface that records pointer activity and fails on demand.
/// Every feed shows the same frames; scrolling advances one frame and sticks on the last.
#[derive(Debug, Default)]
pub struct ScriptedSurface {
    pub frames: Vec<Vec<ScriptedPost>>,
    /// Tooltip text shown after a hover; `None` means the wait times out.
    pub tooltip: Option<String>,
    pub fail_tooltip_wait: bool,
    pub fail_tooltip_text: bool,
    /// Post id whose markup cannot be read.
    pub fail_markup_of: Option<String>,
    /// Feed whose item listing errors.
    pub fail_listing_on: Option<String>,
    /// Feed whose scrolling errors.
    pub fail_scroll_on: Option<String>,
    pub feed: Mutex<String>,
    pub position: Mutex<usize>,
    pub log: Mutex<Vec<String>>,
}

impl ScriptedSurface {
    pub fn new(frames: Vec<Vec<ScriptedPost>>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    /// `park`, `hover:<id>` and `scroll` entries in call order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn current_feed_is(&self, feed: &Option<String>) -> bool {
        feed.as_deref() == Some(self.feed.lock().unwrap().as_str())
    }

    fn visible(&self) -> Vec<ScriptedPost> {
        let position = *self.position.lock().unwrap();
        self.frames.get(position).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FeedSurface for ScriptedSurface {
    type Element = ScriptedElement;

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        let feed = url.rsplit('/').next().unwrap_or_default().to_string();
        *self.feed.lock().unwrap() = feed;
        *self.position.lock().unwrap() = 0;
        Ok(())
    }

    async fn query_all(&self, _selector: &str) -> Result<Vec<ScriptedElement>> {
        if self.current_feed_is(&self.fail_listing_on) {
            return Err(Error::Surface("listing failed".into()));
        }
        Ok(self.visible().into_iter().map(ScriptedElement::Post).collect())
    }

    async fn query(
        &self,
        scope: &ScriptedElement,
        _selector: &str,
    ) -> Result<Option<ScriptedElement>> {
        Ok(match scope {
            ScriptedElement::Post(post) if post.has_link => {
                Some(ScriptedElement::Link(post.clone()))
            }
            _ => None,
        })
    }

    async fn attribute(&self, element: &ScriptedElement, name: &str) -> Result<Option<String>> {
        Ok(match (element, name) {
            (ScriptedElement::Link(post), "href") => {
                Some(format!("/page/posts/{}?__cft__=1", post.id))
            }
            (ScriptedElement::Link(post), "aria-label") => post.label.clone(),
            _ => None,
        })
    }

    async fn inner_text(&self, element: &ScriptedElement) -> Result<String> {
        match element {
            ScriptedElement::Tooltip if self.fail_tooltip_text => {
                Err(Error::Surface("tooltip detached".into()))
            }
            ScriptedElement::Tooltip => Ok(self.tooltip.clone().unwrap_or_default()),
            _ => Ok(String::new()),
        }
    }

    async fn outer_html(&self, element: &ScriptedElement) -> Result<String> {
        match element {
            ScriptedElement::Post(post) if self.fail_markup_of.as_ref() == Some(&post.id) => {
                Err(Error::Surface("stale".into()))
            }
            ScriptedElement::Post(post) => Ok(post_markup(&post.id)),
            _ => Ok(String::new()),
        }
    }

    async fn scroll_into_view(&self, _element: &ScriptedElement) -> Result<()> {
        Ok(())
    }

    async fn hover(&self, element: &ScriptedElement) -> Result<()> {
        if let ScriptedElement::Link(post) = element {
            self.record(format!("hover:{}", post.id));
        }
        Ok(())
    }

    async fn move_pointer(&self, x: f64, y: f64) -> Result<()> {
        if x == 0.0 && y == 0.0 {
            self.record("park".to_string());
        }
        Ok(())
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Option<ScriptedElement>> {
        if selector.contains("tooltip") {
            if self.fail_tooltip_wait {
                return Err(Error::Surface("tooltip wait crashed".into()));
            }
            return Ok(self.tooltip.as_ref().map(|_| ScriptedElement::Tooltip));
        }
        Ok(self.visible().into_iter().next().map(ScriptedElement::Post))
    }

    async fn wait_for_count(
        &self,
        _selector: &str,
        min_count: usize,
        _timeout: Duration,
    ) -> Result<bool> {
        Ok(self.visible().len() >= min_count)
    }

    async fn scroll_viewport(&self, _fraction: f64) -> Result<()> {
        if self.current_feed_is(&self.fail_scroll_on) {
            return Err(Error::Surface("scroll failed".into()));
        }
        self.record("scroll".to_string());
        let mut position = self.position.lock().unwrap();
        if *position + 1 < self.frames.len() {
            *position += 1;
        }
        Ok(())
    }
}

fn post_markup(id: &str) -> String {
    format!(r#"<div data-focus="feed_story"><div data-ad-preview="message">Post {id}</div></div>"#)
}
