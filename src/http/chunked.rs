use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Chunked transfer-coding on top of an async writer.
///
/// Every non-empty write becomes `<hex-len>\r\n<bytes>\r\n`. Empty writes are
/// dropped so they are never mistaken for the terminator, which is only
/// emitted by [`ChunkedWriter::finish`].
pub struct ChunkedWriter<'a, W> {
    inner: &'a mut W,
}

impl<'a, W: AsyncWrite + Unpin> ChunkedWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner }
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.inner
            .write_all(format!("{:x}\r\n", data.len()).as_bytes())
            .await?;
        self.inner.write_all(data).await?;
        self.inner.write_all(b"\r\n").await
    }

    /// Writes the terminating zero-length chunk.
    pub async fn finish(self) -> std::io::Result<()> {
        self.inner.write_all(b"0\r\n\r\n").await
    }
}
