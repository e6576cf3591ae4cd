use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use url::Url;

use crate::error::{CmoviesError, CmoviesResult};

static IMDB_ID_REGEXP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(tt)?(\d{7,8})$").expect("static pattern"));

/// A validated IMDb title identifier.
///
/// Accepts `tt0133093` and `0133093` alike; both name the same title and
/// compare equal. Surrounding whitespace is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImdbId {
    digits: String,
}

impl ImdbId {
    pub fn parse(input: &str) -> CmoviesResult<Self> {
        let trimmed = input.trim();
        let digits = IMDB_ID_REGEXP
            .captures(trimmed)
            .and_then(|cap| cap.get(2))
            .ok_or_else(|| CmoviesError::Validation(input.to_string()))?;

        Ok(Self {
            digits: digits.as_str().to_string(),
        })
    }

    pub fn is_valid(input: &str) -> bool {
        IMDB_ID_REGEXP.is_match(input.trim())
    }

    /// Numeric part, without the `tt` prefix.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Recover the identifier from an embed address built on `base`.
    pub fn from_embed_url(url: &str, base: &str) -> CmoviesResult<Self> {
        let rest = url
            .trim()
            .strip_prefix(base)
            .ok_or_else(|| CmoviesError::InvalidAddress(url.to_string()))?;
        let last = rest
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        Self::parse(last)
    }

    /// Interpolate the identifier into the embed page template.
    pub fn embed_address(&self, base: &str) -> String {
        if base.ends_with('/') {
            format!("{base}{}", self.digits)
        } else {
            format!("{base}/{}", self.digits)
        }
    }
}

impl FromStr for ImdbId {
    type Err = CmoviesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tt{}", self.digits)
    }
}

/// Check that `address` is an absolute http(s) URL.
pub fn validate_page_address(address: &str) -> CmoviesResult<Url> {
    let url = Url::parse(address.trim())
        .map_err(|_| CmoviesError::InvalidAddress(address.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(CmoviesError::InvalidAddress(address.to_string())),
    }
}
