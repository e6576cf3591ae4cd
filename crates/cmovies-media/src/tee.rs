use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes delivered to each side of a [`tee`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeeReport {
    pub file_bytes: u64,
    pub player_bytes: u64,
    /// The player stopped accepting data before the input ended.
    pub player_detached: bool,
}

/// Copy `reader` into `file` and `player` until EOF.
///
/// Each chunk is written to both sinks concurrently. Once a write to the
/// player fails it is dropped and copying continues into the file alone;
/// a failed file write is returned as an error.
pub async fn tee<R, F, P>(mut reader: R, mut file: F, player: Option<P>) -> io::Result<TeeReport>
where
    R: AsyncRead + Unpin,
    F: AsyncWrite + Unpin,
    P: AsyncWrite + Unpin,
{
    let mut report = TeeReport::default();
    let mut player = player;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];

        let mut detach = false;
        match player.as_mut() {
            Some(sink) => {
                let (written, played) = tokio::join!(file.write_all(chunk), sink.write_all(chunk));
                written?;
                match played {
                    Ok(()) => report.player_bytes += n as u64,
                    Err(e) => {
                        log::warn!("Player stopped reading ({e}), continuing download only");
                        detach = true;
                    }
                }
            }
            None => file.write_all(chunk).await?,
        }
        if detach {
            player = None;
            report.player_detached = true;
        }
        report.file_bytes += n as u64;
    }

    file.flush().await?;
    if let Some(mut sink) = player {
        // closing stdin tells the player the stream has ended
        _ = sink.shutdown().await;
    }

    log::debug!(
        "Tee finished: {} bytes to file, {} bytes to player",
        report.file_bytes,
        report.player_bytes
    );
    Ok(report)
}
