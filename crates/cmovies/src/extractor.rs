use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    browser::{chromium::ChromiumEngine, BrowserEngine, LaunchOptions, Session},
    capture::{self, CapturePredicate},
    config::ExtractorConfig,
    error::{CmoviesError, CmoviesResult},
    identifier::{validate_page_address, ImdbId},
    sequence::{Sequencer, Stage, Transition},
};

/// A captured stream address and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub stream_url: String,
    pub page_url: Url,
    /// Title of the embed page, when it had one.
    pub page_title: Option<String>,
    pub elapsed: Duration,
}

impl Capture {
    pub fn into_url(self) -> String {
        self.stream_url
    }
}

/// Runs one browser session per call and reports what it captured.
pub struct Extractor<E = ChromiumEngine> {
    engine: E,
    config: ExtractorConfig,
}

impl Extractor<ChromiumEngine> {
    pub fn chromium(config: ExtractorConfig) -> Self {
        Self::new(ChromiumEngine::new(), config)
    }
}

impl<E> Extractor<E>
where
    E: BrowserEngine,
{
    pub fn new(engine: E, config: ExtractorConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Embed page address for `id` under the configured base.
    pub fn address_for(&self, id: &ImdbId) -> CmoviesResult<Url> {
        Ok(Url::parse(&id.embed_address(&self.config.embed_base_url))?)
    }

    pub async fn extract_id(&self, id: &str) -> CmoviesResult<Capture> {
        let id = ImdbId::parse(id)?;
        let address = self.address_for(&id)?;
        self.extract(&address, &CancellationToken::new()).await
    }

    pub async fn extract_url(&self, address: &str) -> CmoviesResult<Capture> {
        let address = validate_page_address(address)?;
        self.extract(&address, &CancellationToken::new()).await
    }

    /// Capture the stream requested by `page_url`.
    ///
    /// The session is released exactly once whether this returns a capture,
    /// an error, or `Cancelled` after `cancel` fired. Dropping the future
    /// instead aborts the browser from the session's destructor.
    pub async fn extract(
        &self,
        page_url: &Url,
        cancel: &CancellationToken,
    ) -> CmoviesResult<Capture> {
        let started = Instant::now();
        self.config.validate()?;
        let options = LaunchOptions::from(&self.config);

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(CmoviesError::Cancelled {
                    transition: Transition::leaving(Stage::Idle),
                });
            }
            session = Session::acquire(&self.engine, &options) => session?,
        };

        let result = self.drive(&mut session, page_url, cancel).await;
        session.release().await;

        match result {
            Ok((stream_url, page_title)) => {
                let elapsed = started.elapsed();
                log::info!("Captured {stream_url} in {elapsed:?}");
                Ok(Capture {
                    stream_url,
                    page_url: page_url.clone(),
                    page_title,
                    elapsed,
                })
            }
            Err(e) => {
                log::error!("Extraction from {page_url} failed: {e}");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        page_url: &Url,
        cancel: &CancellationToken,
    ) -> CmoviesResult<(String, Option<String>)> {
        let page = session.page()?;

        // must be listening before the first navigation request goes out
        let requests = page.requests().await?;
        let mut capture = capture::attach(
            requests,
            CapturePredicate::extension(self.config.capture_extension.as_str()),
        );

        let mut sequencer = Sequencer::new(page, &mut capture, &self.config, page_url.as_str());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = sequencer.run() => Some(result),
        };

        match outcome {
            Some(result) => {
                let stream_url = result?;
                Ok((stream_url, sequencer.page_title().map(str::to_string)))
            }
            None => {
                let transition = Transition::leaving(sequencer.stage());
                log::warn!("Extraction cancelled during {transition}");
                Err(CmoviesError::Cancelled { transition })
            }
        }
    }
}
