//! Argument vectors for the external tools.

use std::{ffi::OsString, path::Path};

/// `yt-dlp` saving straight to `output`.
pub fn download_args(url: &str, output: &Path, referer: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--no-part".into(), "-o".into(), output.into()];
    push_ytdlp_referer(&mut args, referer);
    args.push(url.into());
    args
}

/// `yt-dlp` writing the stream to stdout.
pub fn pipe_args(url: &str, referer: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--quiet".into(), "-o".into(), "-".into()];
    push_ytdlp_referer(&mut args, referer);
    args.push(url.into());
    args
}

/// Player reading from stdin.
pub fn player_stdin_args(extra: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = extra.iter().map(OsString::from).collect();
    args.push("-".into());
    args
}

/// Player opening `url` itself.
pub fn stream_args(url: &str, referer: Option<&str>, extra: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = extra.iter().map(OsString::from).collect();
    if let Some(referer) = referer {
        args.push(format!("--referrer={referer}").into());
    }
    args.push(url.into());
    args
}

/// `ffmpeg` remuxing the stream into `output`. Refuses to overwrite.
pub fn record_args(url: &str, output: &Path, referer: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-n".into()];
    if let Some(referer) = referer {
        args.push("-headers".into());
        args.push(format!("Referer: {referer}\r\n").into());
    }
    for arg in ["-i", url, "-c", "copy"] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

fn push_ytdlp_referer(args: &mut Vec<OsString>, referer: Option<&str>) {
    if let Some(referer) = referer {
        args.push("--add-header".into());
        args.push(format!("Referer:{referer}").into());
    }
}
