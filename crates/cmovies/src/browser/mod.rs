//! Browser automation seam.
//!
//! The sequencer only talks to [`BrowserEngine`] and [`BrowserPage`]; the
//! chromium implementation lives in [`chromium`] and tests substitute an
//! in-memory page.

pub mod chromium;
mod session;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    config::{ExtractorConfig, ViewportSize},
    error::CmoviesResult,
};

pub use session::Session;

/// Target URLs of outgoing requests, in dispatch order.
pub type RequestStream = BoxStream<'static, String>;

/// Opaque reference to the content document of a frame element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub String);

/// Where a selector is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameScope {
    Top,
    Frame(FrameHandle),
}

/// Headroom given to protocol commands over the navigation timeout, so that
/// the sequencer's own deadline is the one that fires.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    pub viewport: ViewportSize,
    /// Limit for a single protocol command, page loads included.
    pub request_timeout: Duration,
}

impl From<&ExtractorConfig> for LaunchOptions {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            headless: config.headless,
            user_agent: config.user_agent.clone(),
            viewport: config.viewport,
            request_timeout: config
                .navigation_timeout
                .saturating_add(REQUEST_TIMEOUT_SLACK),
        }
    }
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Start one browser instance with one blank page.
    async fn launch(&self, options: &LaunchOptions) -> CmoviesResult<Box<dyn BrowserPage>>;
}

#[async_trait]
pub trait BrowserPage: Send {
    /// Subscribe to outgoing requests. Requests dispatched before the call
    /// are not replayed.
    async fn requests(&mut self) -> CmoviesResult<RequestStream>;

    /// Load `url` and return once the page reports it is ready, with the
    /// HTTP status of the main document when one was observed.
    async fn navigate(&mut self, url: &str) -> CmoviesResult<Option<u16>>;

    /// Address of the top document, after redirects.
    async fn current_url(&mut self) -> CmoviesResult<Option<String>>;

    async fn title(&mut self) -> CmoviesResult<Option<String>>;

    /// Serialized markup of the top document.
    async fn content(&mut self) -> CmoviesResult<String>;

    /// Look for a visible frame element matching `selector` inside `scope`.
    ///
    /// Returns `None` when nothing matches yet; callers poll.
    async fn find_frame(
        &mut self,
        scope: &FrameScope,
        selector: &str,
    ) -> CmoviesResult<Option<FrameHandle>>;

    /// Script-level `element.click()` on the first match of `selector`.
    ///
    /// Returns `false` when no element matched.
    async fn click(&mut self, scope: &FrameScope, selector: &str) -> CmoviesResult<bool>;

    /// Close the page, then the browser instance.
    async fn close(&mut self) -> CmoviesResult<()>;

    /// Synchronous best-effort teardown, used when the owner is dropped
    /// before it could call [`BrowserPage::close`].
    fn abort(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_outlasts_navigation() {
        let mut config = ExtractorConfig::default();
        let options = LaunchOptions::from(&config);
        assert_eq!(options.request_timeout, Duration::from_secs(50));

        config.navigation_timeout = Duration::from_secs(300);
        let options = LaunchOptions::from(&config);
        assert!(options.request_timeout > config.navigation_timeout);
    }
}
