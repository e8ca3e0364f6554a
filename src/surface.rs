use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// The capabilities the crawl loop needs from a rendered, scrollable feed page.
///
/// Implementations own the browser (or a stand-in for one). Every wait is bounded:
/// a `wait_for_*` call suspends until its predicate holds or the timeout elapses,
/// and reports which of the two happened instead of failing.
#[async_trait]
pub trait FeedSurface: Send + Sync {
    /// Handle to an element currently attached to the surface.
    type Element: Send + Sync;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// First descendant of `scope` matching `selector`.
    async fn query(&self, scope: &Self::Element, selector: &str) -> Result<Option<Self::Element>>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    async fn inner_text(&self, element: &Self::Element) -> Result<String>;

    async fn outer_html(&self, element: &Self::Element) -> Result<String>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<()>;

    async fn hover(&self, element: &Self::Element) -> Result<()>;

    async fn move_pointer(&self, x: f64, y: f64) -> Result<()>;

    /// Returns `None` if nothing matched before `timeout`.
    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Self::Element>>;

    /// Returns `false` if fewer than `min_count` elements matched before `timeout`.
    async fn wait_for_count(&self, selector: &str, min_count: usize, timeout: Duration)
        -> Result<bool>;

    /// Scrolls the viewport down by `fraction` of its height.
    async fn scroll_viewport(&self, fraction: f64) -> Result<()>;
}
