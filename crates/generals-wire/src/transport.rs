//! Transport abstractions for the line protocol
//!
//! Provides AsyncReader/AsyncWriter traits plus newline-framed
//! implementations over any tokio byte stream.

use async_trait::async_trait;
use generals_core::{BridgeError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Default cap on a single frame, newline excluded
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// Trait for async reading from a transport
#[async_trait]
pub trait AsyncReader: Send {
    /// Read the next complete frame without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Trait for async writing to a transport
#[async_trait]
pub trait AsyncWriter: Send {
    /// Write one already-terminated frame and flush it
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Close the write side
    async fn shutdown(&mut self) -> Result<()>;
}

/// Accumulation buffer splitting a byte stream on `\n`.
///
/// Partial lines are kept across pushes; `\r\n` endings are accepted and
/// blank lines are skipped.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes at the front of `pending` already searched for a newline
    scanned: usize,
    max_frame: usize,
}

impl LineBuffer {
    pub fn new(max_frame: usize) -> Self {
        Self {
            pending: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
            max_frame,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next non-blank line, if one is complete
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(offset) = self.pending[self.scanned..].iter().position(|&b| b == b'\n')
            else {
                self.scanned = self.pending.len();
                if self.pending.len() > self.max_frame {
                    return Err(BridgeError::FrameTooLarge(self.pending.len()));
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            self.scanned = 0;

            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > self.max_frame {
                return Err(BridgeError::FrameTooLarge(line.len()));
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }

    /// Bytes received but not yet terminated
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

/// Newline-framed reader over any byte stream
pub struct LineReader<R> {
    inner: R,
    buffer: LineBuffer,
    chunk: Box<[u8; READ_CHUNK]>,
}

impl<R> LineReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self {
            inner,
            buffer: LineBuffer::new(max_frame),
            chunk: Box::new([0u8; READ_CHUNK]),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> AsyncReader for LineReader<R> {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.buffer.next_line()? {
                return Ok(Some(line));
            }

            let n = self.inner.read(&mut self.chunk[..]).await?;
            if n == 0 {
                if self.buffer.pending_len() > 0 {
                    debug!(
                        "Stream closed with {} unterminated bytes",
                        self.buffer.pending_len()
                    );
                }
                return Ok(None);
            }
            self.buffer.push(&self.chunk[..n]);
        }
    }
}

/// Frame writer over any byte stream
pub struct LineWriter<W>(pub W);

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> AsyncWriter for LineWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.0.write_all(frame).await?;
        self.0.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.0.shutdown().await?;
        Ok(())
    }
}
