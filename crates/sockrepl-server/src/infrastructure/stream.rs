//! Byte-stream adapters over one connection.
//!
//! [`ConnectionReader`] and [`ConnectionWriter`] wrap the two halves of an
//! accepted socket (or any `AsyncRead` / `AsyncWrite`, which is how the tests
//! drive them) and translate every low-level `io::Error` into a
//! [`TransportError`].

use std::fmt;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::domain::error::TransportError;

// ── Reader ────────────────────────────────────────────────────────────────────

/// Byte-oriented reader with line and skip support.
#[derive(Debug)]
pub struct ConnectionReader<R> {
    inner: BufReader<R>,
    at_line_start: bool,
}

impl<R: AsyncRead + Unpin> ConnectionReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            at_line_start: true,
        }
    }

    /// Next byte, or `None` at end of stream.
    pub async fn read(&mut self) -> Result<Option<u8>, TransportError> {
        // `fill_buf` only touches the socket when the buffer is empty; an
        // empty slice afterwards means the peer closed its side.
        let buf = self.inner.fill_buf().await?;
        let Some(&byte) = buf.first() else {
            return Ok(None);
        };
        self.inner.consume(1);
        self.at_line_start = byte == b'\n';
        Ok(Some(byte))
    }

    /// Exactly `n` bytes, waiting as long as it takes.
    ///
    /// # Errors
    ///
    /// Fails with an `UnexpectedEof` transport error if the stream ends first.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0; n];
        // `read_exact` reports a short stream as `UnexpectedEof`.
        self.inner.read_exact(&mut buf).await?;
        if let Some(&last) = buf.last() {
            self.at_line_start = last == b'\n';
        }
        Ok(buf)
    }

    /// Bytes up to and including the next `\n`.
    ///
    /// At end of stream returns whatever was read, which is empty when the
    /// stream was already exhausted.  There is no length limit.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        while let Some(byte) = self.read().await? {
            line.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        Ok(line)
    }

    /// Discards up to `n` bytes and returns how many were discarded (fewer
    /// than `n` only at end of stream).
    pub async fn skip(&mut self, n: usize) -> Result<usize, TransportError> {
        let mut skipped = 0;
        while skipped < n {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            let take = buf.len().min(n - skipped);
            let last = buf[take - 1];
            self.inner.consume(take);
            self.at_line_start = last == b'\n';
            skipped += take;
        }
        Ok(skipped)
    }

    /// `true` before anything is consumed and right after a `\n`.
    pub fn at_line_start(&self) -> bool {
        self.at_line_start
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writer that sends every write immediately.
#[derive(Debug)]
pub struct ConnectionWriter<W> {
    inner: W,
    shut_down: bool,
}

impl<W: AsyncWrite + Unpin> ConnectionWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            shut_down: false,
        }
    }

    /// Writes all of `bytes` and flushes.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        // `write_all` loops over partial writes; the flush pushes prompts
        // out even though they do not end in a newline.
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Formats and writes, so `write!(writer, "...").await` works.
    pub async fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), TransportError> {
        let text = args.to_string();
        self.write(text.as_bytes()).await
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Closes the write side.  Only the first call touches the connection.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        // Sends FIN on a TCP half; the peer sees end of stream.
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_line_includes_newline_and_stops_after_it() {
        // Arrange
        let mock = Builder::new().read(b"abc\n...").build();
        let mut reader = ConnectionReader::new(mock);

        // Act
        let line = reader.read_line().await.unwrap();

        // Assert
        assert_eq!(line, b"abc\n");
        assert!(reader.at_line_start());
        assert_eq!(reader.read().await.unwrap(), Some(b'.'));
        assert!(!reader.at_line_start());
        assert_eq!(reader.skip(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_read_line_across_chunks() {
        let mock = Builder::new().read(b"ab").read(b"c\nd").build();
        let mut reader = ConnectionReader::new(mock);
        assert_eq!(reader.read_line().await.unwrap(), b"abc\n");
        assert_eq!(reader.read_line().await.unwrap(), b"d");
        assert!(reader.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_returns_none_at_eof() {
        let mock = Builder::new().read(b"x").build();
        let mut reader = ConnectionReader::new(mock);
        assert_eq!(reader.read().await.unwrap(), Some(b'x'));
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_exact_waits_for_all_bytes() {
        let mock = Builder::new().read(b"he").read(b"llo").build();
        let mut reader = ConnectionReader::new(mock);
        assert_eq!(reader.read_exact(5).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_exact_short_stream_is_transport_error() {
        let mock = Builder::new().read(b"hi").build();
        let mut reader = ConnectionReader::new(mock);
        let err = reader.read_exact(5).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_skip_discards_exactly_n() {
        let mock = Builder::new().read(b"12345\n").build();
        let mut reader = ConnectionReader::new(mock);
        assert_eq!(reader.skip(3).await.unwrap(), 3);
        assert_eq!(reader.read_line().await.unwrap(), b"45\n");
    }

    #[tokio::test]
    async fn test_read_error_becomes_transport_error() {
        let mock = Builder::new()
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let mut reader = ConnectionReader::new(mock);
        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_write_and_write_fmt_send_bytes() {
        let mock = Builder::new().write(b"user=> ").write(b"42\n").build();
        let mut writer = ConnectionWriter::new(mock);
        writer.write(b"user=> ").await.unwrap();
        write!(writer, "{}\n", 42).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let mock = Builder::new()
            .write_error(io::Error::from(io::ErrorKind::BrokenPipe))
            .build();
        let mut writer = ConnectionWriter::new(mock);
        let err = writer.write(b"x").await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mock = Builder::new().build();
        let mut writer = ConnectionWriter::new(mock);
        writer.shutdown().await.unwrap();
        writer.shutdown().await.unwrap();
        assert!(writer.is_shut_down());
    }
}
