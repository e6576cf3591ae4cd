use std::fmt;

use fake_user_agent::get_chrome_rua;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::{
    error::{CmoviesError, CmoviesResult},
    identifier::ImdbId,
};

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://v3.sg.media-imdb.com";
pub const DEFAULT_MAX_RESULTS: usize = 50;

const ID_MARKER: &str = "IMDb ID: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub id: ImdbId,
    pub title: String,
    pub year: Option<u32>,
    /// Catalog label such as `feature` or `TV Series`.
    pub kind: Option<String>,
}

impl SearchResult {
    pub fn is_movie(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| {
            kind.eq_ignore_ascii_case("feature") || kind.eq_ignore_ascii_case("movie")
        })
    }

    /// Recover the identifier from a line rendered by [`fmt::Display`].
    pub fn id_from_line(line: &str) -> Option<ImdbId> {
        let (_, id) = line.rsplit_once(ID_MARKER)?;
        ImdbId::parse(id).ok()
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title: {}", self.title)?;
        if let (false, Some(kind)) = (self.is_movie(), &self.kind) {
            write!(f, " ({kind})")?;
        }
        match self.year {
            Some(year) => write!(f, ", Year: {year}")?,
            None => write!(f, ", Year: unknown")?,
        }
        write!(f, ", {ID_MARKER}{}", self.id)
    }
}

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    d: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    id: String,
    #[serde(rename = "l")]
    label: Option<String>,
    #[serde(rename = "q")]
    kind: Option<String>,
    #[serde(rename = "y")]
    year: Option<u32>,
}

/// Title lookup against the IMDb suggestion service.
pub struct SearchClient {
    client: Client,
    base_url: Url,
    max_results: usize,
}

impl SearchClient {
    pub fn new() -> CmoviesResult<Self> {
        Self::with_base_url(DEFAULT_SEARCH_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> CmoviesResult<Self> {
        let client = Client::builder().user_agent(get_chrome_rua()).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    fn query_url(&self, query: &str) -> CmoviesResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CmoviesError::Search(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["suggestion", "x", format!("{query}.json").as_str()]);
        Ok(url)
    }

    /// Candidate titles for `query`, in the order the service ranks them.
    pub async fn search(&self, query: &str) -> CmoviesResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CmoviesError::Search("empty search query".into()));
        }

        let url = self.query_url(&query.to_lowercase())?;
        log::debug!("Searching titles: {url}");
        let response: SuggestionResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let results: Vec<SearchResult> = response
            .d
            .into_iter()
            .filter_map(|suggestion| {
                let id = ImdbId::parse(&suggestion.id).ok()?;
                Some(SearchResult {
                    id,
                    title: suggestion.label.unwrap_or_else(|| suggestion.id.clone()),
                    year: suggestion.year,
                    kind: suggestion.kind,
                })
            })
            .take(self.max_results)
            .collect();

        if results.is_empty() {
            return Err(CmoviesError::Search(format!("no titles found for {query:?}")));
        }
        log::info!("Found {} titles for {query:?}", results.len());
        Ok(results)
    }
}
