//! TCP transport for the line protocol
//!
//! Each accepted connection is split into an owned read half, framed by
//! [`LineReader`], and an owned write half wrapped in [`LineWriter`].

use crate::transport::{LineReader, LineWriter};
use generals_core::Result;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// TCP read wrapper
pub type TcpReadWrapper = LineReader<OwnedReadHalf>;

/// TCP write wrapper
pub type TcpWriteWrapper = LineWriter<OwnedWriteHalf>;

/// Split a connected stream into framed halves.
///
/// Nagle is disabled so each response burst leaves immediately.
pub fn split(stream: TcpStream, max_frame: usize) -> Result<(TcpReadWrapper, TcpWriteWrapper)> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    Ok((
        LineReader::new(read_half, max_frame),
        LineWriter(write_half),
    ))
}
