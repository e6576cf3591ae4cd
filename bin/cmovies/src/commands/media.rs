use std::path::PathBuf;

use clap::Parser;
use clap_handler::handler;
use cmovies_media::{MediaMode, MediaOptions, MediaOutcome};

use super::extract::{extract_interruptible, resolve_address, ExtractorOptions};

#[derive(Parser, Clone, Debug)]
#[clap(name = "media", visible_alias = "m")]
/// Download, play or record a stream with yt-dlp, mpv and ffmpeg
pub struct MediaCommand {
    /// download, play-while-downloading (play), stream or record
    pub mode: MediaMode,

    /// Stream address; with --extract, an IMDb ID or embed page address
    pub target: String,

    /// Capture the stream address from the embed page first
    #[clap(long)]
    pub extract: bool,

    /// Output file
    #[clap(short, long, default_value = "video.mp4")]
    pub output: PathBuf,

    /// Referer sent with stream requests
    #[clap(long)]
    pub referer: Option<String>,

    /// Downloader executable
    #[clap(long, default_value = "yt-dlp", env = "CMOVIES_DOWNLOADER")]
    pub downloader: String,

    /// Player executable
    #[clap(long, default_value = "mpv", env = "CMOVIES_PLAYER")]
    pub player: String,

    /// Recorder executable
    #[clap(long, default_value = "ffmpeg", env = "CMOVIES_RECORDER")]
    pub recorder: String,

    /// Extra player arguments, shell-quoted
    #[clap(long, allow_hyphen_values = true)]
    pub player_args: Option<String>,

    #[clap(flatten)]
    pub extractor: ExtractorOptions,
}

impl MediaCommand {
    fn options(&self) -> anyhow::Result<MediaOptions> {
        let options = MediaOptions {
            downloader: self.downloader.clone(),
            player: self.player.clone(),
            recorder: self.recorder.clone(),
            output: self.output.clone(),
            referer: self.referer.clone(),
            player_args: Vec::new(),
        };
        Ok(match &self.player_args {
            Some(args) => options.with_player_args(args)?,
            None => options,
        })
    }
}

#[handler(MediaCommand)]
pub async fn media_command(me: MediaCommand) -> anyhow::Result<()> {
    let options = me.options()?;

    let url = if me.extract {
        let extractor = me.extractor.extractor()?;
        let address = resolve_address(&extractor, &me.target)?;
        extract_interruptible(&extractor, &address)
            .await?
            .into_url()
    } else {
        me.target.clone()
    };

    match cmovies_media::run(me.mode, &url, &options).await? {
        MediaOutcome::Saved(path) => log::info!("Saved to {}", path.display()),
        MediaOutcome::PlayedAndSaved { path, report } => {
            if report.player_detached {
                log::info!("Player closed early; download continued");
            }
            log::info!("Saved {} bytes to {}", report.file_bytes, path.display());
        }
        MediaOutcome::Played => {}
    }
    Ok(())
}
