use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{CmoviesError, CmoviesResult};

pub const DEFAULT_EMBED_BASE_URL: &str = "https://vidsrc.xyz/embed/movie/";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Upper bound for every timeout and the poll interval.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Every knob the extractor recognizes.
///
/// The timeouts were tuned by hand against a single external site; they are
/// plain data so they can be re-tuned from a config file without touching
/// the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    #[serde(rename = "navigation_timeout_ms", with = "millis")]
    pub navigation_timeout: Duration,

    #[serde(rename = "element_wait_timeout_ms", with = "millis")]
    pub element_wait_timeout: Duration,

    #[serde(rename = "click_timeout_ms", with = "millis")]
    pub click_timeout: Duration,

    #[serde(rename = "capture_timeout_ms", with = "millis")]
    pub capture_timeout: Duration,

    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    pub headless: bool,

    pub embed_base_url: String,

    pub user_agent: String,

    /// Path suffix of the request to capture.
    pub capture_extension: String,

    /// Phrases that mark the loaded page as a block or error page. Matched
    /// case-insensitively against the markup; an empty list turns the check off.
    pub blocking_indicators: Vec<String>,

    /// Pages with less markup than this are treated as blank.
    pub min_content_length: usize,

    pub selectors: Selectors,

    pub viewport: ViewportSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub initial_frame: String,
    pub play_button: String,
    pub player_frame: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(45_000),
            element_wait_timeout: Duration::from_millis(20_000),
            click_timeout: Duration::from_millis(10_000),
            capture_timeout: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(500),
            headless: true,
            embed_base_url: DEFAULT_EMBED_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            capture_extension: ".m3u8".to_string(),
            selectors: Selectors::default(),
            viewport: ViewportSize::default(),
            blocking_indicators: [
                "blocked",
                "access denied",
                "forbidden",
                "not available",
                "error 403",
                "error 404",
            ]
            .map(String::from)
            .to_vec(),
            min_content_length: 100,
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            initial_frame: "iframe".to_string(),
            play_button: "#pl_but_background".to_string(),
            player_frame: r#"iframe[id="player_iframe"]"#.to_string(),
        }
    }
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

impl ExtractorConfig {
    pub fn from_toml(data: &str) -> CmoviesResult<Self> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P>(path: P) -> CmoviesResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        log::debug!("Loading extractor config from {}", path.display());
        let data = std::fs::read_to_string(path)?;
        Self::from_toml(&data)
    }

    pub fn validate(&self) -> CmoviesResult<()> {
        let timeouts = [
            ("navigation_timeout_ms", self.navigation_timeout),
            ("element_wait_timeout_ms", self.element_wait_timeout),
            ("click_timeout_ms", self.click_timeout),
            ("capture_timeout_ms", self.capture_timeout),
            ("poll_interval_ms", self.poll_interval),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(CmoviesError::Config(format!("{name} must be positive")));
            }
            if value > MAX_TIMEOUT {
                return Err(CmoviesError::Config(format!(
                    "{name} must not exceed {} ms",
                    MAX_TIMEOUT.as_millis()
                )));
            }
        }

        let selectors = [
            ("initial_frame", &self.selectors.initial_frame),
            ("play_button", &self.selectors.play_button),
            ("player_frame", &self.selectors.player_frame),
        ];
        for (name, value) in selectors {
            if value.trim().is_empty() {
                return Err(CmoviesError::Config(format!("selector {name} is empty")));
            }
        }

        if self.capture_extension.is_empty() {
            return Err(CmoviesError::Config("capture_extension is empty".into()));
        }

        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
