//! Newline framing for the chat wire protocol.
//!
//! Every protocol unit is one UTF-8 line. Reading goes through
//! [`LineReader`], which buffers partial reads and refuses to grow past a
//! configured maximum so a peer that never sends `\n` cannot exhaust memory.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line exceeds {max} bytes")]
    TooLong { max: usize },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct LineReader<R> {
    inner: FramedRead<R, LinesCodec>,
    max: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, LinesCodec::new_with_max_length(max)),
            max,
        }
    }

    /// Next line with its terminator stripped.
    ///
    /// `Ok(None)` is an orderly close. Bytes that are not valid UTF-8 surface
    /// as [`FrameError::Io`] with kind `InvalidData`.
    pub async fn next_line(&mut self) -> Result<Option<String>, FrameError> {
        match self.inner.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                Err(FrameError::TooLong { max: self.max })
            }
            Some(Err(LinesCodecError::Io(e))) => Err(FrameError::Io(e)),
            None => Ok(None),
        }
    }
}

/// Writes whole lines, appending the terminator.
pub struct LineWriter<W> {
    inner: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    pub async fn send(&mut self, line: &str) -> std::io::Result<()> {
        self.inner.send(line).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "line too long")
            }
        })
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        SinkExt::<&str>::close(&mut self.inner).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => std::io::ErrorKind::InvalidInput.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn joins_a_line_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = LineReader::new(rx, 64);

        tx.write_all(b"hel").await.unwrap();
        tx.flush().await.unwrap();
        let pending = tokio::spawn(async move {
            let first = reader.next_line().await;
            (first, reader)
        });
        tokio::task::yield_now().await;
        tx.write_all(b"lo\r\nworld\n").await.unwrap();
        drop(tx);

        let (first, mut reader) = pending.await.unwrap();
        assert_eq!(first.unwrap().as_deref(), Some("hello"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("world"));
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_lines_past_the_limit() {
        let input: &[u8] = b"0123456789abcdef\nok\n";
        let mut reader = LineReader::new(input, 8);

        match reader.next_line().await {
            Err(FrameError::TooLong { max }) => assert_eq!(max, 8),
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn yields_trailing_fragment_then_eof() {
        let input: &[u8] = b"one\ntwo";
        let mut reader = LineReader::new(input, 64);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("two"));
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_read_error() {
        let input: &[u8] = b"\xff\xfe\n";
        let mut reader = LineReader::new(input, 64);

        assert!(matches!(reader.next_line().await, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn writer_terminates_each_line() {
        let mut out = Vec::new();
        {
            let mut writer = LineWriter::new(&mut out);
            writer.send("a").await.unwrap();
            writer.send("b c").await.unwrap();
        }
        assert_eq!(out, b"a\nb c\n");
    }
}
