//! In-memory browser used to drive the extractor without Chrome.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use cmovies::{
    browser::{BrowserEngine, BrowserPage, FrameHandle, FrameScope, LaunchOptions, RequestStream},
    config::ExtractorConfig,
    CmoviesError, CmoviesResult,
};
use futures::{stream, StreamExt};
use tokio::sync::mpsc;

pub const STREAM_URL: &str = "https://cdn.example.com/hls/index.m3u8?token=abc";
pub const OUTER_FRAME: &str = "outer-frame";
pub const PLAYER_FRAME: &str = "player-frame";
pub const PAGE_TITLE: &str = "The Matrix (1999) - Watch";

const EMBED_MARKUP: &str = r#"<!DOCTYPE html><html><head><title>The Matrix (1999) - Watch</title></head><body><div id="player"><iframe src="https://cloudnestra.example/rcp/abcdef" allowfullscreen></iframe></div></body></html>"#;

/// What the fake page does at each step.
#[derive(Debug, Clone)]
pub struct Script {
    pub fail_launch: bool,
    pub fail_navigation: bool,
    pub hang_navigation: bool,
    /// HTTP status reported for the main document.
    pub status: Option<u16>,
    /// Where the page ends up; `None` stays on the requested address.
    pub landed_url: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub initial_frame: bool,
    pub play_button: bool,
    /// Where the player frame shows up after the trigger click, if at all.
    pub player_frame: Option<FrameScope>,
    pub activation_works: bool,
    pub emit_on_navigate: Vec<String>,
    pub emit_on_trigger: Vec<String>,
    pub emit_on_activate: Vec<String>,
    /// Delayed request sent once the player frame has been found.
    pub autoplay_after: Option<(Duration, String)>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_launch: false,
            fail_navigation: false,
            hang_navigation: false,
            status: Some(200),
            landed_url: None,
            title: Some(PAGE_TITLE.into()),
            content: EMBED_MARKUP.into(),
            initial_frame: true,
            play_button: true,
            player_frame: Some(FrameScope::Frame(FrameHandle(OUTER_FRAME.into()))),
            activation_works: true,
            emit_on_navigate: vec![
                "https://vidsrc.example/embed/movie/0133093".into(),
                "https://vidsrc.example/player.js".into(),
            ],
            emit_on_trigger: vec!["https://vidsrc.example/prorcp/abcdef".into()],
            emit_on_activate: vec![
                "https://cdn.example.com/hls/seg-0.ts".into(),
                STREAM_URL.into(),
                "https://cdn.example.com/hls/other.m3u8".into(),
            ],
            autoplay_after: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub aborts: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Total number of teardowns of any kind.
    pub fn releases(&self) -> usize {
        self.closes() + self.aborts()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

pub struct FakeEngine {
    pub script: Script,
    pub counters: Arc<Counters>,
}

impl FakeEngine {
    pub fn new(script: Script) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                script,
                counters: counters.clone(),
            },
            counters,
        )
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn launch(&self, _options: &LaunchOptions) -> CmoviesResult<Box<dyn BrowserPage>> {
        self.counters.record("launch");
        if self.script.fail_launch {
            return Err(CmoviesError::Browser("could not find chrome".into()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            script: self.script.clone(),
            counters: self.counters.clone(),
            sender: None,
            triggered: false,
            address: None,
        }))
    }
}

pub struct FakePage {
    script: Script,
    counters: Arc<Counters>,
    sender: Option<mpsc::UnboundedSender<String>>,
    triggered: bool,
    address: Option<String>,
}

impl FakePage {
    fn emit(&self, urls: &[String]) {
        if let Some(sender) = &self.sender {
            for url in urls {
                _ = sender.send(url.clone());
            }
        }
    }

    fn is_outer(scope: &FrameScope) -> bool {
        matches!(scope, FrameScope::Frame(FrameHandle(id)) if id == OUTER_FRAME)
    }

    fn is_player(scope: &FrameScope) -> bool {
        matches!(scope, FrameScope::Frame(FrameHandle(id)) if id == PLAYER_FRAME)
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn requests(&mut self) -> CmoviesResult<RequestStream> {
        self.counters.record("requests");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.sender = Some(sender);
        Ok(stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed())
    }

    async fn navigate(&mut self, url: &str) -> CmoviesResult<Option<u16>> {
        self.counters.record(format!("navigate {url}"));
        if self.script.hang_navigation {
            std::future::pending::<()>().await;
        }
        if self.script.fail_navigation {
            return Err(CmoviesError::Browser("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        self.address = Some(
            self.script
                .landed_url
                .clone()
                .unwrap_or_else(|| url.to_string()),
        );
        self.emit(&self.script.emit_on_navigate);
        Ok(self.script.status)
    }

    async fn current_url(&mut self) -> CmoviesResult<Option<String>> {
        Ok(self.address.clone())
    }

    async fn title(&mut self) -> CmoviesResult<Option<String>> {
        Ok(self.script.title.clone())
    }

    async fn content(&mut self) -> CmoviesResult<String> {
        Ok(self.script.content.clone())
    }

    async fn find_frame(
        &mut self,
        scope: &FrameScope,
        selector: &str,
    ) -> CmoviesResult<Option<FrameHandle>> {
        let config = ExtractorConfig::default();

        if *scope == FrameScope::Top
            && selector == config.selectors.initial_frame
            && self.script.initial_frame
        {
            return Ok(Some(FrameHandle(OUTER_FRAME.into())));
        }

        if selector == config.selectors.player_frame
            && self.triggered
            && self.script.player_frame.as_ref() == Some(scope)
        {
            self.counters.record("player found");
            if let (Some((delay, url)), Some(sender)) =
                (self.script.autoplay_after.take(), self.sender.clone())
            {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    _ = sender.send(url);
                });
            }
            return Ok(Some(FrameHandle(PLAYER_FRAME.into())));
        }

        Ok(None)
    }

    async fn click(&mut self, scope: &FrameScope, selector: &str) -> CmoviesResult<bool> {
        let config = ExtractorConfig::default();

        if Self::is_outer(scope) && selector == config.selectors.play_button {
            if !self.script.play_button {
                return Ok(false);
            }
            self.counters.record("click play");
            self.triggered = true;
            self.emit(&self.script.emit_on_trigger);
            return Ok(true);
        }

        if Self::is_player(scope) && selector == "body" {
            if !self.script.activation_works {
                return Err(CmoviesError::Browser("frame detached".into()));
            }
            self.counters.record("click body");
            self.emit(&self.script.emit_on_activate);
            return Ok(true);
        }

        Ok(false)
    }

    async fn close(&mut self) -> CmoviesResult<()> {
        self.counters.record("close");
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.sender = None;
        Ok(())
    }

    fn abort(&mut self) {
        self.counters.record("abort");
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
        self.sender = None;
    }
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cmovies=trace")
        .with_test_writer()
        .try_init();
}
