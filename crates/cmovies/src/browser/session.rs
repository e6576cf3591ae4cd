use super::{BrowserEngine, BrowserPage, LaunchOptions};
use crate::error::{CmoviesError, CmoviesResult};

/// Exclusive owner of one browser instance and its page for a single
/// extraction call.
///
/// [`Session::release`] is idempotent. A session dropped without being
/// released (the owning future was cancelled) falls back to
/// [`BrowserPage::abort`], so teardown happens exactly once on every path.
pub struct Session {
    page: Option<Box<dyn BrowserPage>>,
}

impl Session {
    pub async fn acquire(
        engine: &dyn BrowserEngine,
        options: &LaunchOptions,
    ) -> CmoviesResult<Self> {
        log::debug!(
            "Launching browser (headless={}, viewport={}x{})",
            options.headless,
            options.viewport.width,
            options.viewport.height
        );
        let page = engine.launch(options).await?;
        log::info!("Browser session acquired");

        Ok(Self { page: Some(page) })
    }

    pub fn from_page(page: Box<dyn BrowserPage>) -> Self {
        Self { page: Some(page) }
    }

    pub fn page(&mut self) -> CmoviesResult<&mut dyn BrowserPage> {
        match self.page.as_deref_mut() {
            Some(page) => Ok(page),
            None => Err(CmoviesError::Browser("session already released".into())),
        }
    }

    pub fn is_released(&self) -> bool {
        self.page.is_none()
    }

    /// Close the page and the browser. Errors are logged, never returned:
    /// release usually runs while another error is already propagating.
    pub async fn release(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };

        match page.close().await {
            Ok(()) => log::info!("Browser session released"),
            Err(e) => log::warn!("Error while closing browser session: {e}"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut page) = self.page.take() {
            log::warn!("Browser session dropped before release, aborting");
            page.abort();
        }
    }
}
