//! Data-channel byte filters
//!
//! Filters wrap the file source/sink of a transfer. The only shipped
//! filter is the ASCII line-ending translation active under `TYPE A`:
//! outbound LF becomes CRLF, inbound CRLF becomes LF. Because that
//! changes the byte count, the chain reports `modifies_length()` and the
//! commands veto APPE/REST/SIZE while it is active.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::fs::{FileSink, FileSource};
use crate::session::DataType;

/// A byte-stream transform applied to transfers
pub trait DataFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the transform may change the number of bytes. Length-
    /// changing filters make REST offsets and SIZE results meaningless.
    fn modifies_length(&self) -> bool;

    /// Wrap an outbound (server-to-client) source
    fn wrap_read(&self, inner: FileSource) -> FileSource;

    /// Wrap an inbound (client-to-server) sink
    fn wrap_write(&self, inner: FileSink) -> FileSink;
}

/// Selects the filters active for a session's TYPE setting and applies
/// them to transfer channels.
pub struct FilterChain {
    ascii: Arc<dyn DataFilter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            ascii: Arc::new(AsciiFilter),
        }
    }

    /// Filters active for the given TYPE
    pub fn active(&self, data_type: DataType) -> Vec<Arc<dyn DataFilter>> {
        match data_type {
            DataType::Ascii => vec![self.ascii.clone()],
            DataType::Image => Vec::new(),
        }
    }

    /// Whether any active filter changes the byte count
    pub fn modifies_length(&self, data_type: DataType) -> bool {
        self.active(data_type).iter().any(|f| f.modifies_length())
    }

    pub fn apply_read(&self, data_type: DataType, mut source: FileSource) -> FileSource {
        for filter in self.active(data_type) {
            source = filter.wrap_read(source);
        }
        source
    }

    pub fn apply_write(&self, data_type: DataType, mut sink: FileSink) -> FileSink {
        for filter in self.active(data_type) {
            sink = filter.wrap_write(sink);
        }
        sink
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// ASCII (TYPE A) line-ending translation
pub struct AsciiFilter;

impl DataFilter for AsciiFilter {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn modifies_length(&self) -> bool {
        true
    }

    fn wrap_read(&self, inner: FileSource) -> FileSource {
        Box::new(AsciiReader {
            inner,
            buf: Vec::new(),
            pos: 0,
            last_cr: false,
        })
    }

    fn wrap_write(&self, inner: FileSink) -> FileSink {
        Box::new(AsciiWriter {
            inner,
            pending: Vec::new(),
            pending_pos: 0,
            held_cr: false,
        })
    }
}

/// Expands bare LF to CRLF on the way out
struct AsciiReader {
    inner: FileSource,
    buf: Vec<u8>,
    pos: usize,
    last_cr: bool,
}

impl AsyncRead for AsciiReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        loop {
            if self.pos < self.buf.len() {
                let n = (self.buf.len() - self.pos).min(out.remaining());
                out.put_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Poll::Ready(Ok(()));
            }

            let mut tmp = [0u8; 4096];
            let mut tmp_buf = ReadBuf::new(&mut tmp);
            match Pin::new(&mut self.inner).poll_read(cx, &mut tmp_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let filled = tmp_buf.filled();
                    if filled.is_empty() {
                        return Poll::Ready(Ok(()));
                    }
                    let chunk: Vec<u8> = filled.to_vec();
                    self.buf.clear();
                    self.pos = 0;
                    for b in chunk {
                        if b == b'\n' && !self.last_cr {
                            self.buf.push(b'\r');
                        }
                        self.buf.push(b);
                        self.last_cr = b == b'\r';
                    }
                }
            }
        }
    }
}

/// Collapses CRLF to LF on the way in
struct AsciiWriter {
    inner: FileSink,
    pending: Vec<u8>,
    pending_pos: usize,
    held_cr: bool,
}

impl AsciiWriter {
    /// Push buffered bytes into the inner sink
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        while self.pending_pos < self.pending.len() {
            match Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.pending_pos..]) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(n)) => self.pending_pos += n,
            }
        }
        self.pending.clear();
        self.pending_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for AsciiWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.poll_drain(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }

        let mut held_cr = self.held_cr;
        let mut translated = Vec::with_capacity(buf.len());
        for &b in buf {
            if held_cr {
                held_cr = false;
                if b == b'\n' {
                    translated.push(b'\n');
                    continue;
                }
                translated.push(b'\r');
            }
            if b == b'\r' {
                held_cr = true;
            } else {
                translated.push(b);
            }
        }
        self.held_cr = held_cr;
        self.pending = translated;
        self.pending_pos = 0;

        // Opportunistic drain; leftovers go out on the next call
        match self.poll_drain(cx) {
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) | Poll::Pending => {}
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.poll_drain(cx) {
            Poll::Ready(Ok(())) => {}
            other => return other,
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.held_cr {
            self.held_cr = false;
            self.pending.push(b'\r');
        }
        match self.poll_drain(cx) {
            Poll::Ready(Ok(())) => {}
            other => return other,
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn read_filtered(input: &[u8]) -> Vec<u8> {
        let filter = AsciiFilter;
        let mut source = filter.wrap_read(Box::new(Cursor::new(input.to_vec())));
        let mut out = Vec::new();
        source.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_read_expands_lf() {
        assert_eq!(read_filtered(b"a\nb\n").await, b"a\r\nb\r\n");
    }

    #[tokio::test]
    async fn test_read_keeps_existing_crlf() {
        assert_eq!(read_filtered(b"a\r\nb\n").await, b"a\r\nb\r\n");
    }

    #[tokio::test]
    async fn test_read_plain_bytes_untouched() {
        assert_eq!(read_filtered(b"abc").await, b"abc");
    }

    #[tokio::test]
    async fn test_write_collapses_crlf() {
        let out = collect_write(b"a\r\nb\r\n").await;
        assert_eq!(out, b"a\nb\n");
    }

    #[tokio::test]
    async fn test_write_keeps_bare_lf_and_lone_cr() {
        assert_eq!(collect_write(b"a\nb").await, b"a\nb");
        assert_eq!(collect_write(b"a\rb").await, b"a\rb");
    }

    #[tokio::test]
    async fn test_write_cr_split_across_chunks() {
        let filter = AsciiFilter;
        let (client, mut server) = tokio::io::duplex(64);
        let mut sink = filter.wrap_write(Box::new(client));
        sink.write_all(b"a\r").await.unwrap();
        sink.write_all(b"\nb").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"a\nb");
    }

    #[tokio::test]
    async fn test_write_trailing_cr_emitted_on_shutdown() {
        assert_eq!(collect_write(b"end\r").await, b"end\r");
    }

    async fn collect_write(input: &[u8]) -> Vec<u8> {
        let filter = AsciiFilter;
        let (client, mut server) = tokio::io::duplex(4096);
        let mut sink = filter.wrap_write(Box::new(client));
        sink.write_all(input).await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        out
    }

    #[test]
    fn test_chain_selection() {
        let chain = FilterChain::new();
        assert!(chain.modifies_length(DataType::Ascii));
        assert!(!chain.modifies_length(DataType::Image));
        assert_eq!(chain.active(DataType::Ascii).len(), 1);
        assert!(chain.active(DataType::Image).is_empty());
    }
}
