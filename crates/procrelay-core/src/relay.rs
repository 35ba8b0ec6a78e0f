use crate::stdio::{RelayStdErr, RelayStdOut, RelayStdio};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};
use tracing::debug;

/// One piece of child output, exactly as the pipe delivered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
    /// Spawn failure or a broken pipe, reported in-band instead of raised
    Error(String),
}

impl OutputChunk {
    pub fn text(&self) -> &str {
        match self {
            OutputChunk::Stdout(s) | OutputChunk::Stderr(s) | OutputChunk::Error(s) => s,
        }
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputChunk::Stdout(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutputChunk::Error(_))
    }
}

/// Decodes whatever is buffered into one text chunk.
///
/// Never splits a UTF-8 sequence: an incomplete trailing sequence waits for
/// the next read. Invalid bytes are replaced with U+FFFD.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkCodec;

impl Decoder for ChunkCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match std::str::from_utf8(src) {
            Ok(s) => {
                let out = s.to_owned();
                src.clear();
                Ok(Some(out))
            }
            Err(e) => match e.error_len() {
                None => {
                    let valid = e.valid_up_to();

                    if valid == 0 {
                        return Ok(None);
                    }

                    let out = String::from_utf8_lossy(&src[..valid]).into_owned();
                    src.advance(valid);
                    Ok(Some(out))
                }
                Some(invalid) => {
                    let end = e.valid_up_to() + invalid;
                    let out = String::from_utf8_lossy(&src[..end]).into_owned();
                    src.advance(end);
                    Ok(Some(out))
                }
            },
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // truncated sequence at end of stream
        let out = String::from_utf8_lossy(src).into_owned();
        src.clear();
        Ok(Some(out))
    }
}

/// Read `reader` until EOF, sending each decoded chunk through `tx`.
///
/// Stops early when the receiving side is gone. A full channel makes this
/// wait, which is how backpressure reaches the child's pipe.
pub async fn pump<R>(
    reader: R,
    capacity: usize,
    wrap: fn(String) -> OutputChunk,
    tx: mpsc::Sender<OutputChunk>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::with_capacity(reader, ChunkCodec, capacity);

    while let Some(frame) = frames.next().await {
        let chunk = match frame {
            Ok(text) => wrap(text),
            Err(e) => OutputChunk::Error(format!("Failed to read child output: {e}")),
        };
        let stop = chunk.is_error();

        if tx.send(chunk).await.is_err() {
            debug!("Output receiver dropped, no longer reading child pipe");
            return;
        }

        if stop {
            return;
        }
    }
}

/// Counts of what a relay forwarded
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub stdout_chunks: usize,
    pub stderr_chunks: usize,
    pub errors: usize,
}

/// Drain `output`, writing each chunk once to the matching sink in arrival order
pub async fn relay<S>(
    mut output: S,
    out: RelayStdOut,
    err: RelayStdErr,
) -> std::io::Result<RelaySummary>
where
    S: Stream<Item = OutputChunk> + Unpin,
{
    let out = RelayStdio::from(out);
    let err = RelayStdio::from(err);
    let mut summary = RelaySummary::default();

    while let Some(chunk) = output.next().await {
        match chunk {
            OutputChunk::Stdout(text) => {
                out.write_chunk(text.as_bytes()).await?;
                summary.stdout_chunks += 1;
            }
            OutputChunk::Stderr(text) => {
                err.write_chunk(text.as_bytes()).await?;
                summary.stderr_chunks += 1;
            }
            OutputChunk::Error(text) => {
                err.write_chunk(format!("{text}\n").as_bytes()).await?;
                summary.errors += 1;
            }
        }
    }

    Ok(summary)
}
