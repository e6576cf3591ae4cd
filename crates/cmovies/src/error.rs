use std::time::Duration;

use thiserror::Error;

use crate::sequence::Transition;

#[derive(Error, Debug)]
pub enum CmoviesError {
    #[error("Invalid IMDb ID {0:?}: expected 7 or 8 digits, optionally prefixed with 'tt'")]
    Validation(String),

    #[error("Invalid page address {0:?}: expected an absolute http(s) URL")]
    InvalidAddress(String),

    #[error("{transition}: navigation to {url} failed after {elapsed:?}: {cause}")]
    Navigation {
        transition: Transition,
        url: String,
        elapsed: Duration,
        cause: String,
    },

    #[error("{transition}: no visible element matched {selector:?} within {elapsed:?}")]
    ElementNotFound {
        transition: Transition,
        selector: String,
        elapsed: Duration,
    },

    #[error("{transition}: could not click {selector:?}: {cause}")]
    Interaction {
        transition: Transition,
        selector: String,
        cause: String,
    },

    #[error("{transition}: no stream request was observed within {elapsed:?}")]
    ExtractionTimeout {
        transition: Transition,
        elapsed: Duration,
    },

    #[error("{transition}: extraction cancelled")]
    Cancelled { transition: Transition },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl CmoviesError {
    /// The sequencer transition that was in progress when this error happened.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            Self::Navigation { transition, .. }
            | Self::ElementNotFound { transition, .. }
            | Self::Interaction { transition, .. }
            | Self::ExtractionTimeout { transition, .. }
            | Self::Cancelled { transition } => Some(*transition),
            _ => None,
        }
    }

    /// Whether retrying the same call may succeed without changing the
    /// configuration. Only page load failures and engine hiccups qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Browser(_) | Self::Http(_))
    }
}

impl From<chromiumoxide::error::CdpError> for CmoviesError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}

pub type CmoviesResult<T> = Result<T, CmoviesError>;
