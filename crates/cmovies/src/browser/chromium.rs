use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    cdp::{
        browser_protocol::{
            dom::DescribeNodeParams,
            network::{EnableParams, EventRequestWillBeSent, EventResponseReceived, ResourceType},
            page::{AddScriptToEvaluateOnNewDocumentParams, FrameId},
        },
        js_protocol::runtime::{EvaluateParams, EvaluateReturns, ExecutionContextId},
    },
    handler::viewport::Viewport,
    Page,
};
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;

use super::{BrowserEngine, BrowserPage, FrameHandle, FrameScope, LaunchOptions, RequestStream};
use crate::error::{CmoviesError, CmoviesResult};

/// Flags that hide the usual automation fingerprints and keep nested frames
/// in the page's own renderer, so their documents are reachable from it.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-extensions",
    "--no-first-run",
    "--disable-default-apps",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--autoplay-policy=no-user-gesture-required",
];

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Launches a local Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
}

impl ChromiumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self, options: &LaunchOptions) -> CmoviesResult<Box<dyn BrowserPage>> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .viewport(Viewport {
                width: options.viewport.width,
                height: options.viewport.height,
                ..Default::default()
            })
            .args(LAUNCH_ARGS.iter().copied())
            .request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(CmoviesError::Browser)?;

        let (mut browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::trace!("chromium handler event error: {e}");
                }
            }
        });

        let page = match open_page(&browser, &options.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                // the page never reached the caller, so tear down here
                _ = browser.close().await;
                _ = browser.wait().await;
                handler.abort();
                return Err(e);
            }
        };

        Ok(Box::new(ChromiumPage {
            browser: Some(browser),
            page,
            handler,
        }))
    }
}

async fn open_page(browser: &Browser, user_agent: &str) -> CmoviesResult<Page> {
    let page = browser.new_page("about:blank").await?;
    page.set_user_agent(user_agent).await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await?;
    page.execute(EnableParams::default()).await?;
    Ok(page)
}

struct ChromiumPage {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

enum EvalTarget {
    Default,
    Context(ExecutionContextId),
    /// The frame exists but its document has no script context yet.
    Unavailable,
}

impl ChromiumPage {
    async fn target(&self, scope: &FrameScope) -> CmoviesResult<EvalTarget> {
        match scope {
            FrameScope::Top => Ok(EvalTarget::Default),
            FrameScope::Frame(FrameHandle(id)) => {
                let context = self
                    .page
                    .frame_execution_context(FrameId::new(id.clone()))
                    .await?;
                Ok(context.map_or(EvalTarget::Unavailable, EvalTarget::Context))
            }
        }
    }

    async fn evaluate(
        &self,
        context: Option<ExecutionContextId>,
        expression: String,
        by_value: bool,
    ) -> CmoviesResult<EvaluateReturns> {
        let mut params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(by_value)
            .await_promise(false);
        if let Some(context) = context {
            params = params.context_id(context);
        }
        let params = params.build().map_err(CmoviesError::Browser)?;

        let response = self.page.execute(params).await?.result;
        if let Some(exception) = &response.exception_details {
            return Err(CmoviesError::Browser(format!(
                "script exception: {}",
                exception.text
            )));
        }
        Ok(response)
    }
}

fn find_visible_script(selector: &str) -> CmoviesResult<String> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ \
            const el = document.querySelector({selector}); \
            if (!el) return null; \
            const rect = el.getBoundingClientRect(); \
            return rect.width > 0 && rect.height > 0 ? el : null; \
        }})()"
    ))
}

fn click_script(selector: &str) -> CmoviesResult<String> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ \
            const el = document.querySelector({selector}); \
            if (!el) return false; \
            el.click(); \
            return true; \
        }})()"
    ))
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn requests(&mut self) -> CmoviesResult<RequestStream> {
        let events = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await?;
        Ok(events.map(|event| event.request.url.clone()).boxed())
    }

    async fn navigate(&mut self, url: &str) -> CmoviesResult<Option<u16>> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?;
        self.page.goto(url).await?;

        // the document response is dispatched before the load completes, so
        // it is already buffered; redirects leave the final one last
        let main_frame = self.page.mainframe().await?;
        let mut status = None;
        while let Some(Some(event)) = responses.next().now_or_never() {
            if event.r#type == ResourceType::Document
                && main_frame.is_some()
                && event.frame_id == main_frame
            {
                status = u16::try_from(event.response.status).ok();
            }
        }
        if let Some(status) = status {
            log::debug!("Main document answered with HTTP {status}");
        }
        Ok(status)
    }

    async fn current_url(&mut self) -> CmoviesResult<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn title(&mut self) -> CmoviesResult<Option<String>> {
        Ok(self.page.get_title().await?)
    }

    async fn content(&mut self) -> CmoviesResult<String> {
        Ok(self.page.content().await?)
    }

    async fn find_frame(
        &mut self,
        scope: &FrameScope,
        selector: &str,
    ) -> CmoviesResult<Option<FrameHandle>> {
        let context = match self.target(scope).await? {
            EvalTarget::Default => None,
            EvalTarget::Context(context) => Some(context),
            EvalTarget::Unavailable => return Ok(None),
        };

        let response = self
            .evaluate(context, find_visible_script(selector)?, false)
            .await?;
        let Some(object_id) = response.result.object_id else {
            return Ok(None);
        };

        let node = self
            .page
            .execute(DescribeNodeParams::builder().object_id(object_id).build())
            .await?
            .result
            .node;

        Ok(node.frame_id.map(|id| FrameHandle(id.inner().clone())))
    }

    async fn click(&mut self, scope: &FrameScope, selector: &str) -> CmoviesResult<bool> {
        let context = match self.target(scope).await? {
            EvalTarget::Default => None,
            EvalTarget::Context(context) => Some(context),
            EvalTarget::Unavailable => return Ok(false),
        };

        let response = self.evaluate(context, click_script(selector)?, true).await?;
        Ok(response
            .result
            .value
            .as_ref()
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn close(&mut self) -> CmoviesResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        if let Err(e) = self.page.clone().close().await {
            log::debug!("Failed to close page: {e}");
        }
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            log::debug!("Failed to wait for browser exit: {e}");
        }
        self.handler.abort();

        closed?;
        Ok(())
    }

    fn abort(&mut self) {
        self.handler.abort();
        // dropping the browser kills the child process
        drop(self.browser.take());
    }
}
