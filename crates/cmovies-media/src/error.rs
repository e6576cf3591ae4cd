use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{program} is not installed or not on PATH: {source}")]
    MissingExecutable {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("{program} failed with {status}")]
    ToolFailed { program: String, status: ExitStatus },

    #[error("Unknown mode {0:?}: expected download, play-while-downloading, stream or record")]
    InvalidMode(String),

    #[error("Invalid player arguments: {0:?}")]
    InvalidArgs(String),

    #[error("{0} was spawned without a pipe")]
    MissingPipe(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;
