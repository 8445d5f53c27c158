//! Line-oriented reader over an async byte stream.

use std::io;

use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Read fault on an output stream.
///
/// Carries whatever fragment of the current line had been read before the
/// fault so callers can still deliver it.
#[derive(Debug, Error)]
#[error("Failed to read output stream: {source}")]
pub struct LineReadError {
    #[source]
    source: io::Error,
    partial: Option<String>,
}

impl LineReadError {
    fn new(source: io::Error, partial: Option<String>) -> Self {
        Self { source, partial }
    }

    /// True for the benign "stream already closed" race during shutdown.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.source.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof
        ) || self.source.to_string().contains("already closed")
    }

    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    pub fn take_partial(&mut self) -> Option<String> {
        self.partial.take()
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }
}

/// Yields complete lines from a buffered stream.
///
/// Fragments are accumulated until a `\n` (an optional preceding `\r` is
/// dropped) or end-of-stream. A trailing fragment without a terminator is
/// returned as the last line. The reader is single-pass: once it has
/// returned `None` or an error it stays exhausted.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    exhausted: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            exhausted: false,
        }
    }

    /// Next complete line, `Ok(None)` at end-of-stream.
    pub async fn next_line(&mut self) -> Result<Option<String>, LineReadError> {
        if self.exhausted {
            return Ok(None);
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => {
                self.exhausted = true;
                Ok(None)
            }
            Ok(n) => {
                log::trace!("read {} raw bytes: {:?}", n, String::from_utf8_lossy(&self.buf));
                if self.buf.last() != Some(&b'\n') {
                    // Unterminated fragment only happens at end-of-stream.
                    self.exhausted = true;
                }
                Ok(Some(self.take_line()))
            }
            Err(e) => {
                self.exhausted = true;
                let partial = if self.buf.is_empty() { None } else { Some(self.take_line()) };
                Err(LineReadError::new(e, partial))
            }
        }
    }

    /// Consume the reader into a lazy stream of lines.
    ///
    /// The stream ends after end-of-stream or after yielding one error.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, LineReadError>> {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    /// Serves `data`, then fails with `kind`.
    struct FailingReader {
        data: Vec<u8>,
        pos: usize,
        kind: io::ErrorKind,
        message: &'static str,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.pos < self.data.len() {
                let n = buf.remaining().min(self.data.len() - self.pos);
                let start = self.pos;
                buf.put_slice(&self.data[start..start + n]);
                self.pos += n;
                return Poll::Ready(Ok(()));
            }
            Poll::Ready(Err(io::Error::new(self.kind, self.message)))
        }
    }

    fn failing(data: &str, kind: io::ErrorKind, message: &'static str) -> BufReader<FailingReader> {
        BufReader::new(FailingReader {
            data: data.as_bytes().to_vec(),
            pos: 0,
            kind,
            message,
        })
    }

    #[tokio::test]
    async fn test_single_line_then_clean_end() {
        let mut reader = LineReader::new(&b"build ok\n"[..]);

        assert_eq!(reader.next_line().await.unwrap(), Some("build ok".to_string()));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unterminated_final_line() {
        let mut reader = LineReader::new(&b"first\nlast without newline"[..]);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("last without newline"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_and_empty_lines() {
        let mut reader = LineReader::new(&b"a\r\n\nb\n"[..]);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lines_longer_than_buffer_are_reassembled() {
        let long = "x".repeat(100);
        let input = format!("{}\nshort\n", long);
        let buffered = BufReader::with_capacity(4, input.as_bytes());
        let mut reader = LineReader::new(buffered);

        assert_eq!(reader.next_line().await.unwrap(), Some(long));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("short"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_stream_is_benign() {
        let mut reader = LineReader::new(failing("ok\n", io::ErrorKind::Other, "read |0: file already closed"));

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("ok"));
        let err = reader.next_line().await.unwrap_err();
        assert!(err.is_closed());
        assert!(err.partial().is_none());
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fault_keeps_partial_fragment() {
        let mut reader = LineReader::new(failing("half a li", io::ErrorKind::PermissionDenied, "denied"));

        let mut err = reader.next_line().await.unwrap_err();
        assert!(!err.is_closed());
        assert_eq!(err.take_partial().as_deref(), Some("half a li"));
        assert_eq!(err.io_error().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_stream_yields_lines_in_order() {
        let reader = LineReader::new(&b"one\ntwo\nthree"[..]);
        let lines: Vec<String> = reader.into_stream().map(|l| l.unwrap()).collect().await;

        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let reader = LineReader::new(failing("a\n", io::ErrorKind::BrokenPipe, "pipe"));
        let items: Vec<_> = reader.into_stream().collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].as_ref().unwrap_err().is_closed());
    }
}
