use futures::StreamExt;
use tokio::{sync::oneshot, task::JoinHandle};
use url::Url;

use crate::browser::RequestStream;

/// Decides whether an outgoing request is the stream being looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePredicate {
    extension: String,
}

impl CapturePredicate {
    /// Match requests whose path (query and fragment excluded) ends with
    /// `extension`.
    pub fn extension<S>(extension: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            extension: extension.into(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => url.path().ends_with(&self.extension),
            Err(_) => url
                .split(['?', '#'])
                .next()
                .is_some_and(|path| path.ends_with(&self.extension)),
        }
    }
}

impl Default for CapturePredicate {
    fn default() -> Self {
        Self::extension(".m3u8")
    }
}

/// Start watching `requests`. The first URL accepted by `predicate` is
/// delivered through the returned handle; everything after it is ignored.
pub fn attach(mut requests: RequestStream, predicate: CapturePredicate) -> CaptureHandle {
    let (sender, receiver) = oneshot::channel();

    let task = tokio::spawn(async move {
        while let Some(url) = requests.next().await {
            if predicate.matches(&url) {
                log::info!("Captured stream request: {url}");
                // the receiver only goes away together with the handle
                _ = sender.send(url);
                return;
            }
            log::trace!("Ignoring request {url}");
        }
        log::debug!("Request stream ended without a match");
    });

    CaptureHandle {
        receiver,
        slot: None,
        closed: false,
        task,
    }
}

/// Read side of the single capture slot.
///
/// Once populated the slot never changes for the lifetime of the handle.
pub struct CaptureHandle {
    receiver: oneshot::Receiver<String>,
    slot: Option<String>,
    closed: bool,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Non-blocking look at the slot.
    pub fn try_get(&mut self) -> Option<&str> {
        if self.slot.is_none() && !self.closed {
            match self.receiver.try_recv() {
                Ok(url) => self.slot = Some(url),
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => self.closed = true,
            }
        }
        self.slot.as_deref()
    }

    /// Wait until the slot is populated.
    ///
    /// Returns `None` if the request stream ended first; nothing can be
    /// captured after that.
    pub async fn wait(&mut self) -> Option<String> {
        if self.slot.is_none() && !self.closed {
            match (&mut self.receiver).await {
                Ok(url) => self.slot = Some(url),
                Err(_) => self.closed = true,
            }
        }
        self.slot.clone()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
