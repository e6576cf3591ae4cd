//! The scripted walk through the embed page.
//!
//! ```text
//! Idle -> Loaded -> FrameFound -> Triggered -> PlayerReady -> Activated -> Captured
//!                                                                        \-> TimedOut
//! ```
//!
//! Every transition has its own function and its own bounded wait. Any
//! failure before `Activated` ends the walk; nothing is retried here.

use std::{fmt, time::Duration};

use tokio::time::{sleep_until, timeout, timeout_at, Instant};

use crate::{
    browser::{BrowserPage, FrameHandle, FrameScope},
    capture::CaptureHandle,
    config::ExtractorConfig,
    error::{CmoviesError, CmoviesResult},
};

/// Element clicked inside the player frame to start playback.
const ACTIVATION_SELECTOR: &str = "body";

/// Address fragments of the pages a blocked visitor is redirected to.
const BLOCKED_ADDRESS_MARKERS: &[&str] = &["blocked", "error"];

/// Deadline used when `start + limit` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(start: Instant, limit: Duration) -> Instant {
    start
        .checked_add(limit)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Loaded,
    FrameFound,
    Triggered,
    PlayerReady,
    Activated,
    Captured,
    TimedOut,
}

impl Stage {
    /// The stage a successful step from `self` leads to.
    pub fn next(self) -> Stage {
        match self {
            Stage::Idle => Stage::Loaded,
            Stage::Loaded => Stage::FrameFound,
            Stage::FrameFound => Stage::Triggered,
            Stage::Triggered => Stage::PlayerReady,
            Stage::PlayerReady => Stage::Activated,
            Stage::Activated | Stage::Captured => Stage::Captured,
            Stage::TimedOut => Stage::TimedOut,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "Idle",
            Stage::Loaded => "Loaded",
            Stage::FrameFound => "FrameFound",
            Stage::Triggered => "Triggered",
            Stage::PlayerReady => "PlayerReady",
            Stage::Activated => "Activated",
            Stage::Captured => "Captured",
            Stage::TimedOut => "TimedOut",
        };
        f.write_str(name)
    }
}

/// A step between two stages, as reported in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
}

impl Transition {
    pub fn new(from: Stage, to: Stage) -> Self {
        Self { from, to }
    }

    /// The step that would run next from `from`.
    pub fn leaving(from: Stage) -> Self {
        Self::new(from, from.next())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.from, self.to)
    }
}

enum State {
    Idle,
    Loaded,
    FrameFound { outer: FrameHandle },
    Triggered { outer: FrameHandle },
    PlayerReady { player: FrameHandle },
    Activated,
    Captured(String),
}

impl State {
    fn stage(&self) -> Stage {
        match self {
            State::Idle => Stage::Idle,
            State::Loaded => Stage::Loaded,
            State::FrameFound { .. } => Stage::FrameFound,
            State::Triggered { .. } => Stage::Triggered,
            State::PlayerReady { .. } => Stage::PlayerReady,
            State::Activated => Stage::Activated,
            State::Captured(_) => Stage::Captured,
        }
    }
}

/// Outcome of a bounded poll.
enum Polled<T> {
    Ready(T),
    /// The capture slot filled while waiting; the DOM step is moot.
    Captured(String),
    Expired {
        elapsed: Duration,
        last_error: Option<String>,
    },
}

pub struct Sequencer<'a> {
    page: &'a mut dyn BrowserPage,
    capture: &'a mut CaptureHandle,
    config: &'a ExtractorConfig,
    address: &'a str,
    stage: Stage,
    title: Option<String>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        page: &'a mut dyn BrowserPage,
        capture: &'a mut CaptureHandle,
        config: &'a ExtractorConfig,
        address: &'a str,
    ) -> Self {
        Self {
            page,
            capture,
            config,
            address,
            stage: Stage::Idle,
            title: None,
        }
    }

    /// Last stage reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Title of the embed page, once it has loaded.
    pub fn page_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Drive the page until the stream request is captured.
    pub async fn run(&mut self) -> CmoviesResult<String> {
        let mut state = State::Idle;
        loop {
            if let State::Captured(url) = state {
                return Ok(url);
            }

            let from = state.stage();
            state = self.step(state).await?;
            self.stage = state.stage();
            log::info!("{}", Transition::new(from, self.stage));
        }
    }

    async fn step(&mut self, state: State) -> CmoviesResult<State> {
        if !matches!(state, State::Idle) {
            if let Some(url) = self.capture.try_get() {
                log::debug!("Stream already captured at {}", state.stage());
                return Ok(State::Captured(url.to_string()));
            }
        }

        match state {
            State::Idle => self.navigate().await,
            State::Loaded => self.locate().await,
            State::FrameFound { outer } => self.trigger(outer).await,
            State::Triggered { outer } => self.wait_for_player(outer).await,
            State::PlayerReady { player } => self.activate(player).await,
            State::Activated => self.await_capture().await,
            State::Captured(url) => Ok(State::Captured(url)),
        }
    }

    async fn navigate(&mut self) -> CmoviesResult<State> {
        let started = Instant::now();
        log::info!("Navigating to {}", self.address);

        let loaded = timeout(self.config.navigation_timeout, self.page.navigate(self.address)).await;
        let status = match loaded {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(self.navigation_error(started, e.to_string())),
            Err(_) => {
                let cause = "page did not become ready in time".to_string();
                return Err(self.navigation_error(started, cause));
            }
        };

        self.check_landing(status, started).await?;
        Ok(State::Loaded)
    }

    fn navigation_error(&self, started: Instant, cause: String) -> CmoviesError {
        CmoviesError::Navigation {
            transition: Transition::leaving(Stage::Idle),
            url: self.address.to_string(),
            elapsed: started.elapsed(),
            cause,
        }
    }

    /// Reject loads that ended somewhere other than a usable embed page.
    async fn check_landing(&mut self, status: Option<u16>, started: Instant) -> CmoviesResult<()> {
        if let Some(status) = status.filter(|status| *status >= 400) {
            return Err(self.navigation_error(started, format!("HTTP error {status}")));
        }

        let landed = self.page.current_url().await?.unwrap_or_default();
        if landed.is_empty() || landed == "about:blank" {
            return Err(self.navigation_error(started, "page remained blank".to_string()));
        }
        if landed != self.address {
            log::info!("Landed on {landed}");
        }
        let lowered = landed.to_lowercase();
        if BLOCKED_ADDRESS_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            return Err(self.navigation_error(
                started,
                format!("redirected to blocking page {landed}"),
            ));
        }

        self.title = match self.page.title().await {
            Ok(title) => title.filter(|title| !title.trim().is_empty()),
            Err(e) => {
                log::debug!("Could not read page title: {e}");
                None
            }
        };
        if let Some(title) = &self.title {
            log::info!("Page title: {title}");
        }

        let content = self.page.content().await?;
        log::debug!("Page content length: {} bytes", content.len());
        let lowered = content.to_lowercase();
        if let Some(indicator) = self
            .config
            .blocking_indicators
            .iter()
            .find(|indicator| !indicator.is_empty() && lowered.contains(&indicator.to_lowercase()))
        {
            return Err(self.navigation_error(
                started,
                format!("site blocking detected: {indicator:?}"),
            ));
        }
        if content.trim().len() < self.config.min_content_length {
            return Err(self.navigation_error(
                started,
                format!("page appears empty ({} bytes)", content.trim().len()),
            ));
        }

        Ok(())
    }

    async fn locate(&mut self) -> CmoviesResult<State> {
        let transition = Transition::leaving(Stage::Loaded);
        let selector = self.config.selectors.initial_frame.clone();

        match self
            .poll_frame(transition, &[FrameScope::Top], &selector)
            .await
        {
            Polled::Ready(outer) => Ok(State::FrameFound { outer }),
            Polled::Captured(url) => Ok(State::Captured(url)),
            Polled::Expired { elapsed, .. } => Err(CmoviesError::ElementNotFound {
                transition,
                selector,
                elapsed,
            }),
        }
    }

    async fn trigger(&mut self, outer: FrameHandle) -> CmoviesResult<State> {
        let transition = Transition::leaving(Stage::FrameFound);
        let selector = self.config.selectors.play_button.clone();
        let scope = FrameScope::Frame(outer.clone());

        match self
            .poll_click(transition, &scope, &selector, self.config.element_wait_timeout)
            .await
        {
            Polled::Ready(()) => Ok(State::Triggered { outer }),
            Polled::Captured(url) => Ok(State::Captured(url)),
            Polled::Expired {
                elapsed,
                last_error,
            } => Err(CmoviesError::Interaction {
                transition,
                selector,
                cause: last_error
                    .unwrap_or_else(|| format!("no element present after {elapsed:?}")),
            }),
        }
    }

    async fn wait_for_player(&mut self, outer: FrameHandle) -> CmoviesResult<State> {
        let transition = Transition::leaving(Stage::Triggered);
        let selector = self.config.selectors.player_frame.clone();
        // the player frame is normally nested in the first frame, but some
        // mirrors insert it into the top document instead
        let scopes = [FrameScope::Frame(outer), FrameScope::Top];

        match self.poll_frame(transition, &scopes, &selector).await {
            Polled::Ready(player) => Ok(State::PlayerReady { player }),
            Polled::Captured(url) => Ok(State::Captured(url)),
            Polled::Expired { elapsed, .. } => Err(CmoviesError::ElementNotFound {
                transition,
                selector,
                elapsed,
            }),
        }
    }

    async fn activate(&mut self, player: FrameHandle) -> CmoviesResult<State> {
        let transition = Transition::leaving(Stage::PlayerReady);
        let scope = FrameScope::Frame(player);

        match self
            .poll_click(
                transition,
                &scope,
                ACTIVATION_SELECTOR,
                self.config.click_timeout,
            )
            .await
        {
            Polled::Ready(()) => Ok(State::Activated),
            Polled::Captured(url) => Ok(State::Captured(url)),
            Polled::Expired {
                elapsed,
                last_error,
            } => {
                // players commonly autoplay, so keep listening regardless
                log::warn!(
                    "{transition}: activation click failed after {elapsed:?}: {}",
                    last_error.as_deref().unwrap_or("player frame has no body")
                );
                Ok(State::Activated)
            }
        }
    }

    async fn await_capture(&mut self) -> CmoviesResult<State> {
        let started = Instant::now();
        log::info!(
            "Waiting up to {:?} for the stream request",
            self.config.capture_timeout
        );

        match timeout(self.config.capture_timeout, self.capture.wait()).await {
            Ok(Some(url)) => Ok(State::Captured(url)),
            Ok(None) => {
                log::warn!("Request stream closed before any stream was requested");
                Err(CmoviesError::ExtractionTimeout {
                    transition: Transition::new(Stage::Activated, Stage::TimedOut),
                    elapsed: started.elapsed(),
                })
            }
            Err(_) => Err(CmoviesError::ExtractionTimeout {
                transition: Transition::new(Stage::Activated, Stage::TimedOut),
                elapsed: started.elapsed(),
            }),
        }
    }

    /// Look for a visible frame matching `selector` in each of `scopes`,
    /// every poll interval, until the element wait timeout.
    async fn poll_frame(
        &mut self,
        transition: Transition,
        scopes: &[FrameScope],
        selector: &str,
    ) -> Polled<FrameHandle> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.config.element_wait_timeout);
        let mut last_error = None;

        loop {
            for scope in scopes {
                match timeout_at(deadline, self.page.find_frame(scope, selector)).await {
                    Ok(Ok(Some(frame))) => {
                        log::debug!("{transition}: found {selector:?} as frame {}", frame.0);
                        return Polled::Ready(frame);
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        log::debug!("{transition}: lookup of {selector:?} failed: {e}");
                        last_error = Some(e.to_string());
                    }
                    Err(_) => break,
                }
            }

            if let Some(url) = self.capture.try_get() {
                return Polled::Captured(url.to_string());
            }
            if Instant::now() >= deadline {
                return Polled::Expired {
                    elapsed: started.elapsed(),
                    last_error,
                };
            }
            sleep_until(deadline.min(deadline_after(Instant::now(), self.config.poll_interval))).await;
        }
    }

    /// Click the first element matching `selector` in `scope` as soon as it
    /// exists, giving up after `limit`.
    async fn poll_click(
        &mut self,
        transition: Transition,
        scope: &FrameScope,
        selector: &str,
        limit: Duration,
    ) -> Polled<()> {
        let started = Instant::now();
        let deadline = deadline_after(started, limit);
        let mut last_error = None;

        loop {
            match timeout_at(deadline, self.page.click(scope, selector)).await {
                Ok(Ok(true)) => {
                    log::debug!("{transition}: clicked {selector:?}");
                    return Polled::Ready(());
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    log::debug!("{transition}: click on {selector:?} failed: {e}");
                    last_error = Some(e.to_string());
                }
                Err(_) => {}
            }

            if let Some(url) = self.capture.try_get() {
                return Polled::Captured(url.to_string());
            }
            if Instant::now() >= deadline {
                return Polled::Expired {
                    elapsed: started.elapsed(),
                    last_error,
                };
            }
            sleep_until(deadline.min(deadline_after(Instant::now(), self.config.poll_interval))).await;
        }
    }
}
