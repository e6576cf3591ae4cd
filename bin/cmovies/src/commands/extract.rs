use std::{
    future::Future,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use clap::{Args, Parser};
use clap_handler::handler;
use cmovies::{
    browser::chromium::ChromiumEngine,
    identifier::validate_page_address,
    Capture, CmoviesError, Extractor, ExtractorConfig, ImdbId, SearchClient, SearchResult,
};
use tokio_util::sync::CancellationToken;

use crate::select;

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

const QUIT_WORDS: &[&str] = &["q", "quit", "exit"];

#[derive(Parser, Clone, Debug)]
#[clap(name = "extract", visible_alias = "x")]
/// Capture the stream address of a movie
pub struct ExtractCommand {
    #[clap(flatten)]
    pub target: TargetOptions,

    #[clap(flatten)]
    pub extractor: ExtractorOptions,

    /// Also write the address to this file
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
pub struct TargetOptions {
    /// Search IMDb by title and pick a result; prompts for the title when empty
    #[clap(short, long, num_args = 0..=1, default_missing_value = "")]
    pub search: Option<String>,

    /// IMDb ID, with or without the `tt` prefix
    #[clap(short, long)]
    pub imdb_id: Option<String>,

    /// Embed page address
    #[clap(short, long)]
    pub url: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ExtractorOptions {
    /// Extractor settings file (TOML)
    #[clap(long, env = "CMOVIES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show the browser window
    #[clap(long)]
    pub no_headless: bool,

    /// Chrome or Chromium executable
    #[clap(long, env = "CHROME")]
    pub chrome: Option<PathBuf>,

    /// Page load timeout, in seconds
    #[clap(long)]
    pub navigation_timeout: Option<u64>,

    /// Timeout for each frame to appear, in seconds
    #[clap(long)]
    pub element_timeout: Option<u64>,

    /// Timeout for the stream request after playback starts, in seconds
    #[clap(long)]
    pub capture_timeout: Option<u64>,

    /// Embed page prefix the IMDb ID is appended to
    #[clap(long)]
    pub embed_base_url: Option<String>,

    /// Selector of the first frame on the embed page
    #[clap(long)]
    pub initial_frame_selector: Option<String>,

    /// Selector of the play button inside the first frame
    #[clap(long)]
    pub play_button_selector: Option<String>,

    /// Selector of the player frame inserted by the play button
    #[clap(long)]
    pub player_frame_selector: Option<String>,
}

impl ExtractorOptions {
    /// Defaults, then the settings file, then flags.
    pub fn load(&self) -> anyhow::Result<ExtractorConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractorConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExtractorConfig::default(),
        };

        if self.no_headless {
            config.headless = false;
        }
        if let Some(secs) = self.navigation_timeout {
            config.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.element_timeout {
            config.element_wait_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.capture_timeout {
            config.capture_timeout = Duration::from_secs(secs);
        }
        if let Some(base) = &self.embed_base_url {
            config.embed_base_url = base.clone();
        }
        if let Some(selector) = &self.initial_frame_selector {
            config.selectors.initial_frame = selector.clone();
        }
        if let Some(selector) = &self.play_button_selector {
            config.selectors.play_button = selector.clone();
        }
        if let Some(selector) = &self.player_frame_selector {
            config.selectors.player_frame = selector.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn extractor(&self) -> anyhow::Result<Extractor> {
        let engine = ChromiumEngine::new().with_executable(self.chrome.clone());
        Ok(Extractor::new(engine, self.load()?))
    }
}

/// Turn an IMDb ID or page address into the page to open.
///
/// Addresses under the embed base are re-validated through their ID.
pub fn resolve_address(extractor: &Extractor, input: &str) -> anyhow::Result<url::Url> {
    let base = &extractor.config().embed_base_url;
    if ImdbId::is_valid(input) {
        return Ok(extractor.address_for(&ImdbId::parse(input)?)?);
    }
    match ImdbId::from_embed_url(input, base) {
        Ok(id) => Ok(extractor.address_for(&id)?),
        Err(CmoviesError::InvalidAddress(_)) => Ok(validate_page_address(input)?),
        Err(e) => Err(e.into()),
    }
}

/// Run one extraction, turning Ctrl-C into a clean shutdown.
///
/// The browser is closed before the process exits with status 130.
pub async fn extract_interruptible(
    extractor: &Extractor,
    address: &url::Url,
) -> anyhow::Result<Capture> {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, closing the browser");
            canceller.cancel();
        }
    });

    let result = extractor.extract(address, &token).await;
    watcher.abort();

    match result {
        Ok(capture) => Ok(capture),
        Err(CmoviesError::Cancelled { .. }) => std::process::exit(EXIT_INTERRUPTED),
        Err(e) => Err(e.into()),
    }
}

/// Ask for a title. `None` when input ends or the user quits.
fn read_title<R, W>(mut input: R, mut prompt: W) -> anyhow::Result<Option<String>>
where
    R: BufRead,
    W: Write,
{
    write!(prompt, "Enter movie title (q to quit): ")?;
    prompt.flush()?;
    let mut title = String::new();
    if input.read_line(&mut title)? == 0 {
        return Ok(None);
    }

    let title = title.trim();
    if QUIT_WORDS.iter().any(|word| title.eq_ignore_ascii_case(word)) {
        return Ok(None);
    }
    Ok(Some(title.to_string()))
}

/// Search and pick until a title is chosen or the user gives up.
///
/// `query` is tried first when not blank. A failed search or an empty
/// selection goes back to the title prompt.
async fn pick_title<T, C, F>(
    client: &SearchClient,
    mut query: Option<String>,
    mut next_title: T,
    mut choose: C,
) -> anyhow::Result<Option<SearchResult>>
where
    T: FnMut() -> anyhow::Result<Option<String>>,
    C: FnMut(Vec<SearchResult>) -> F,
    F: Future<Output = anyhow::Result<Option<SearchResult>>>,
{
    loop {
        let title = match query.take().filter(|query| !query.trim().is_empty()) {
            Some(query) => query,
            None => match next_title()? {
                Some(title) => title,
                None => return Ok(None),
            },
        };
        if title.is_empty() {
            continue;
        }

        let results = match client.search(&title).await {
            Ok(results) => results,
            Err(e) => {
                log::warn!("{e}");
                continue;
            }
        };
        if let Some(choice) = choose(results).await? {
            return Ok(Some(choice));
        }
        log::info!("Nothing selected");
    }
}

async fn search_and_pick(extractor: &Extractor, query: &str) -> anyhow::Result<Option<url::Url>> {
    let client = SearchClient::new()?;
    let choice = pick_title(
        &client,
        Some(query.to_string()),
        || read_title(std::io::stdin().lock(), std::io::stderr()),
        |results| async move { anyhow::Ok(select::choose(&results).await?.cloned()) },
    )
    .await?;

    let Some(choice) = choice else {
        return Ok(None);
    };
    log::info!("Selected {choice}");
    Ok(Some(extractor.address_for(&choice.id)?))
}

/// With `--quiet` and an output file, stdout stays empty.
fn prints_address(quiet: bool, output: Option<&Path>) -> bool {
    !(quiet && output.is_some())
}

#[handler(ExtractCommand)]
pub async fn extract_command(me: ExtractCommand) -> anyhow::Result<()> {
    let extractor = me.extractor.extractor()?;

    let address = match (&me.target.search, &me.target.imdb_id, &me.target.url) {
        (Some(query), _, _) => match search_and_pick(&extractor, query).await? {
            Some(address) => address,
            None => {
                log::info!("No movie selected");
                return Ok(());
            }
        },
        (_, Some(id), _) => extractor.address_for(&ImdbId::parse(id)?)?,
        (_, _, Some(url)) => resolve_address(&extractor, url)?,
        _ => bail!("one of --search, --imdb-id or --url is required"),
    };

    let capture = extract_interruptible(&extractor, &address).await?;
    if let Some(output) = &me.output {
        tokio::fs::write(output, format!("{}\n", capture.stream_url))
            .await
            .with_context(|| format!("writing {}", output.display()))?;
        log::info!("Stream address saved to {}", output.display());
    }
    if prints_address(crate::is_quiet(), me.output.as_deref()) {
        println!("{}", capture.stream_url);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use clap::Parser;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[clap(flatten)]
        target: TargetOptions,
        #[clap(flatten)]
        extractor: ExtractorOptions,
    }

    fn extractor() -> Extractor {
        Extractor::new(ChromiumEngine::new(), ExtractorConfig::default())
    }

    #[test]
    fn test_exactly_one_target() {
        assert!(Cli::try_parse_from(["x"]).is_err());
        assert!(Cli::try_parse_from(["x", "-i", "tt0133093", "-u", "https://a.b/"]).is_err());

        let cli = Cli::try_parse_from(["x", "-i", "tt0133093"]).unwrap();
        assert_eq!(cli.target.imdb_id.as_deref(), Some("tt0133093"));

        let cli = Cli::try_parse_from(["x", "--search"]).unwrap();
        assert_eq!(cli.target.search.as_deref(), Some(""));

        let cli = Cli::try_parse_from(["x", "-s", "the matrix"]).unwrap();
        assert_eq!(cli.target.search.as_deref(), Some("the matrix"));
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "x",
            "-i",
            "0133093",
            "--no-headless",
            "--capture-timeout",
            "90",
            "--play-button-selector",
            "#play",
        ])
        .unwrap();
        let config = cli.extractor.load().unwrap();

        assert!(!config.headless);
        assert_eq!(config.capture_timeout, Duration::from_secs(90));
        assert_eq!(config.selectors.play_button, "#play");
        assert_eq!(config.element_wait_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmovies.toml");
        std::fs::write(&path, "capture_timeout_ms = 5000\nclick_timeout_ms = 1000\n").unwrap();

        let options = ExtractorOptions {
            config: Some(path),
            capture_timeout: Some(7),
            ..Default::default()
        };
        let config = options.load().unwrap();
        assert_eq!(config.capture_timeout, Duration::from_secs(7));
        assert_eq!(config.click_timeout, Duration::from_secs(1));

        let options = ExtractorOptions {
            element_timeout: Some(0),
            ..Default::default()
        };
        assert!(options.load().is_err());
    }

    #[test]
    fn test_resolve_address() {
        let extractor = extractor();

        let url = resolve_address(&extractor, "https://vidsrc.xyz/embed/movie/tt0133093").unwrap();
        assert_eq!(url.as_str(), "https://vidsrc.xyz/embed/movie/0133093");

        let url = resolve_address(&extractor, "tt0133093").unwrap();
        assert_eq!(url.as_str(), "https://vidsrc.xyz/embed/movie/0133093");

        let url = resolve_address(&extractor, "https://mirror.example/embed/42").unwrap();
        assert_eq!(url.as_str(), "https://mirror.example/embed/42");

        assert!(resolve_address(&extractor, "https://vidsrc.xyz/embed/movie/12").is_err());
        assert!(resolve_address(&extractor, "not a url").is_err());
    }

    #[test]
    fn test_read_title() {
        let mut prompt = Vec::new();
        let title = read_title(Cursor::new("  The Matrix \n"), &mut prompt).unwrap();
        assert_eq!(title.as_deref(), Some("The Matrix"));
        assert_eq!(
            String::from_utf8(prompt).unwrap(),
            "Enter movie title (q to quit): "
        );

        for input in ["q\n", "QUIT\n", "exit\n", ""] {
            assert_eq!(read_title(Cursor::new(input), Vec::new()).unwrap(), None);
        }
        assert_eq!(
            read_title(Cursor::new("\n"), Vec::new()).unwrap().as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_quiet_output_file_keeps_stdout_empty() {
        let file = Path::new("stream.txt");
        assert!(prints_address(false, None));
        assert!(prints_address(false, Some(file)));
        assert!(prints_address(true, None));
        assert!(!prints_address(true, Some(file)));
    }

    async fn search_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/suggestion/x/the%20matrix.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"d":[{"id":"tt0133093","l":"The Matrix","q":"feature","y":1999},{"id":"tt0234215","l":"The Matrix Reloaded","q":"feature","y":2003}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"d":[]}"#))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_pick_title_asks_again() {
        let server = search_server().await;
        let client = SearchClient::with_base_url(&server.uri()).unwrap();

        // no hits, then a blank line, then a real title
        let mut input = Cursor::new("\nthe matrix\nthe matrix\n");
        let mut offered = Vec::new();
        let choice = pick_title(
            &client,
            Some("zzzz".to_string()),
            || read_title(&mut input, Vec::new()),
            |results| {
                offered.push(results.len());
                // back out of the first list, take the second entry of the next
                let pick = (offered.len() > 1).then(|| results[1].clone());
                async move { anyhow::Ok(pick) }
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(choice.title, "The Matrix Reloaded");
        assert_eq!(offered, [2, 2]);
    }

    #[tokio::test]
    async fn test_pick_title_quits() {
        let server = search_server().await;
        let client = SearchClient::with_base_url(&server.uri()).unwrap();

        let mut input = Cursor::new("the matrix\nq\n");
        let choice = pick_title(
            &client,
            None,
            || read_title(&mut input, Vec::new()),
            |_| async { anyhow::Ok(None) },
        )
        .await
        .unwrap();
        assert_eq!(choice, None);

        let mut input = Cursor::new("");
        let choice = pick_title(
            &client,
            Some("   ".to_string()),
            || read_title(&mut input, Vec::new()),
            |_| async { anyhow::Ok(None) },
        )
        .await
        .unwrap();
        assert_eq!(choice, None);
    }
}
