//! Capture the HLS stream address behind a movie embed page.
//!
//! [`Extractor`] drives a browser through the embed page of a title and
//! returns the first `.m3u8` request the page makes. [`search`] resolves
//! free-text titles to identifiers.

pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod extractor;
pub mod identifier;
pub mod search;
pub mod sequence;

pub use config::ExtractorConfig;
pub use error::{CmoviesError, CmoviesResult};
pub use extractor::{Capture, Extractor};
pub use identifier::ImdbId;
pub use search::{SearchClient, SearchResult};
