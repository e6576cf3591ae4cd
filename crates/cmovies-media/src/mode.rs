use std::{fmt, str::FromStr};

use crate::error::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    /// Save the stream to a file.
    Download,
    /// Save the stream and feed the same bytes to a player.
    PlayWhileDownloading,
    /// Let the player open the stream; nothing is saved.
    Stream,
    /// Copy a live stream to a file without re-encoding.
    Record,
}

impl MediaMode {
    pub fn writes_file(self) -> bool {
        !matches!(self, MediaMode::Stream)
    }
}

impl FromStr for MediaMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(MediaMode::Download),
            "play-while-downloading" | "play" => Ok(MediaMode::PlayWhileDownloading),
            "stream" => Ok(MediaMode::Stream),
            "record" => Ok(MediaMode::Record),
            _ => Err(MediaError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaMode::Download => "download",
            MediaMode::PlayWhileDownloading => "play-while-downloading",
            MediaMode::Stream => "stream",
            MediaMode::Record => "record",
        })
    }
}
