//! Download, play or record a stream address through external tools.
//!
//! The heavy lifting is done by `yt-dlp`, `mpv` and `ffmpeg`; this crate
//! picks the right invocation for a [`MediaMode`] and, when playing while
//! downloading, duplicates the downloader's output with [`tee`].

pub mod command;
pub mod error;
pub mod mode;
pub mod tee;

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use tokio::process::Command;

pub use error::{MediaError, MediaResult};
pub use mode::MediaMode;
pub use tee::{tee, TeeReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    pub downloader: String,
    pub player: String,
    pub recorder: String,
    pub output: PathBuf,
    pub referer: Option<String>,
    pub player_args: Vec<String>,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            downloader: "yt-dlp".to_string(),
            player: "mpv".to_string(),
            recorder: "ffmpeg".to_string(),
            output: PathBuf::from("video.mp4"),
            referer: None,
            player_args: Vec::new(),
        }
    }
}

impl MediaOptions {
    /// Split a shell-quoted argument string for the player.
    pub fn with_player_args(mut self, args: &str) -> MediaResult<Self> {
        self.player_args =
            shlex::split(args).ok_or_else(|| MediaError::InvalidArgs(args.to_string()))?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Saved(PathBuf),
    PlayedAndSaved { path: PathBuf, report: TeeReport },
    Played,
}

fn locate(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|source| MediaError::MissingExecutable {
        program: program.to_string(),
        source,
    })
}

fn check(program: &str, status: ExitStatus) -> MediaResult<()> {
    if status.success() {
        log::info!("{program} finished");
        Ok(())
    } else {
        Err(MediaError::ToolFailed {
            program: program.to_string(),
            status,
        })
    }
}

async fn run_to_end(program: &str, args: Vec<OsString>) -> MediaResult<ExitStatus> {
    let path = locate(program)?;
    log::debug!("Spawning {} {:?}", path.display(), args);
    let status = Command::new(path)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await?;
    Ok(status)
}

/// Handle `url` according to `mode`.
pub async fn run(mode: MediaMode, url: &str, options: &MediaOptions) -> MediaResult<MediaOutcome> {
    let referer = options.referer.as_deref();
    log::info!("Running {mode} for {url}");
    if mode.writes_file() {
        prepare_output_dir(&options.output).await?;
    }

    match mode {
        MediaMode::Download => {
            let args = command::download_args(url, &options.output, referer);
            let status = run_to_end(&options.downloader, args).await?;
            check(&options.downloader, status)?;
            Ok(MediaOutcome::Saved(options.output.clone()))
        }
        MediaMode::PlayWhileDownloading => play_while_downloading(url, options).await,
        MediaMode::Stream => {
            let args = command::stream_args(url, referer, &options.player_args);
            let status = run_to_end(&options.player, args).await?;
            log::debug!("{} exited with {status}", options.player);
            Ok(MediaOutcome::Played)
        }
        MediaMode::Record => {
            let args = command::record_args(url, &options.output, referer);
            let status = run_to_end(&options.recorder, args).await?;
            check(&options.recorder, status)?;
            Ok(MediaOutcome::Saved(options.output.clone()))
        }
    }
}

async fn play_while_downloading(url: &str, options: &MediaOptions) -> MediaResult<MediaOutcome> {
    let downloader = locate(&options.downloader)?;
    let player = locate(&options.player)?;

    let mut source = Command::new(downloader)
        .args(command::pipe_args(url, options.referer.as_deref()))
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let mut sink = Command::new(player)
        .args(command::player_stdin_args(&options.player_args))
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let reader = source
        .stdout
        .take()
        .ok_or(MediaError::MissingPipe("downloader"))?;
    let player_input = sink.stdin.take();
    let file = tokio::fs::File::create(&options.output).await?;

    let report = tee(reader, file, player_input).await?;
    let status = source.wait().await?;
    check(&options.downloader, status)?;

    // the player may still be showing buffered data; let the user close it
    match sink.wait().await {
        Ok(status) => log::debug!("{} exited with {status}", options.player),
        Err(e) => log::warn!("Failed to wait for {}: {e}", options.player),
    }

    Ok(MediaOutcome::PlayedAndSaved {
        path: options.output.clone(),
        report,
    })
}

/// The tools write the file themselves but not every one creates its directory.
async fn prepare_output_dir(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
