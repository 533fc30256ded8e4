//! Buffered reader for NUL-delimited fields
//!
//! The server never announces field lengths, so the reader keeps a fixed
//! buffer and refills it from the socket only once every buffered byte has
//! been consumed.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

pub struct FramedReader<R> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    /// Aborts a pending socket read once cancelled
    shutdown: Option<CancellationToken>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            shutdown: None,
        }
    }

    /// Makes every read that waits on the socket fail with a `Connection`
    /// error as soon as `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Number of bytes read from the socket but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.len - self.pos
    }

    async fn fill(&mut self) -> Result<()> {
        let read = self.inner.read(&mut self.buf);
        let n = match &self.shutdown {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ClientError::closed("Read aborted")),
                n = read => n,
            },
            None => read.await,
        }
        .map_err(|e| ClientError::io("Read failed", e))?;
        if n == 0 {
            return Err(ClientError::Connection(
                "Read failed: connection closed by peer".to_string(),
            ));
        }
        self.pos = 0;
        self.len = n;
        Ok(())
    }

    /// Returns the next byte, waiting for the socket if the buffer is empty.
    pub async fn read_byte(&mut self) -> Result<u8> {
        if self.pos >= self.len {
            self.fill().await?;
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Returns every byte up to `delimiter`, consuming the delimiter.
    ///
    /// The delimiter may arrive any number of refills later.
    pub async fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            if self.pos >= self.len {
                self.fill().await?;
            }
            let window = &self.buf[self.pos..self.len];
            match window.iter().position(|&b| b == delimiter) {
                Some(idx) => {
                    out.extend_from_slice(&window[..idx]);
                    self.pos += idx + 1;
                    return Ok(out);
                }
                None => {
                    out.extend_from_slice(window);
                    self.pos = self.len;
                }
            }
        }
    }

    /// Reads one NUL-terminated UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_until(0).await?;
        String::from_utf8(bytes)
            .map_err(|e| ClientError::Protocol(format!("Invalid UTF-8 in server string: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_byte_and_string() {
        let mock = Builder::new().read(b"\x01hello\0\x00").build();
        let mut reader = FramedReader::new(mock);

        assert_eq!(reader.read_byte().await.unwrap(), 1);
        assert_eq!(reader.read_string().await.unwrap(), "hello");
        assert_eq!(reader.read_byte().await.unwrap(), 0);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_delimiter_spans_refills() {
        // Four-byte buffer against a 26-byte string delivered in odd chunks
        let mock = Builder::new()
            .read(b"abcdefghij")
            .read(b"klmnopq")
            .read(b"rstuvwxyz\0tail\0")
            .build();
        let mut reader = FramedReader::with_capacity(mock, 4);

        assert_eq!(
            reader.read_string().await.unwrap(),
            "abcdefghijklmnopqrstuvwxyz"
        );
        assert_eq!(reader.read_string().await.unwrap(), "tail");
    }

    #[tokio::test]
    async fn test_empty_string_and_consecutive_fields() {
        let mock = Builder::new().read(b"\0\0x\0").build();
        let mut reader = FramedReader::new(mock);

        assert_eq!(reader.read_string().await.unwrap(), "");
        assert_eq!(reader.read_string().await.unwrap(), "");
        assert_eq!(reader.read_string().await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_custom_delimiter() {
        let mock = Builder::new().read(b"key=value").build();
        let mut reader = FramedReader::new(mock);

        assert_eq!(reader.read_until(b'=').await.unwrap(), b"key".to_vec());
        assert_eq!(reader.buffered(), 5);
    }

    #[tokio::test]
    async fn test_eof_is_connection_error() {
        let mock = Builder::new().read(b"partial").build();
        let mut reader = FramedReader::new(mock);

        let err = reader.read_string().await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_socket_error_propagates() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut reader = FramedReader::new(mock);

        let err = reader.read_byte().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mock = Builder::new().read(b"\xff\xfe\0").build();
        let mut reader = FramedReader::new(mock);

        let err = reader.read_string().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_read() {
        let (_server, client) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        let mut reader = FramedReader::new(client).with_shutdown(token.clone());

        let pending = tokio::spawn(async move { reader.read_string().await });
        tokio::task::yield_now().await;
        token.cancel();

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("Read aborted"));
    }
}
