use std::io::{self, ErrorKind};

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

use crate::codec::{Frame, CONNECTION_PREFACE};
use crate::{AppError, AppResult};

/// Read side of one connection.
///
/// Bytes accumulate in `buffer` until a complete frame can be split off.
/// The write half lives with the connection's driver, wrapped in a
/// `BufWriter`, so handshake and response writes never contend with reads.
#[derive(Debug)]
pub struct Connection {
    reader: OwnedReadHalf,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Connection {
    pub fn new(reader: OwnedReadHalf, read_buffer_size: usize, max_frame_size: usize) -> Connection {
        Connection {
            reader,
            buffer: BytesMut::with_capacity(read_buffer_size),
            max_frame_size,
        }
    }

    /// Reads and validates the fixed 24-byte connection preface.
    ///
    /// Any byte mismatch is `InvalidPreface` and the connection must be
    /// dropped without processing frames. A peer close before all 24 bytes
    /// arrive is a connection reset, not a clean EOF.
    pub async fn read_preface(&mut self) -> AppResult<()> {
        while self.buffer.len() < CONNECTION_PREFACE.len() {
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                return Err(io::Error::new(
                    ErrorKind::ConnectionReset,
                    "connection closed during preface",
                )
                .into());
            }
        }
        let preface = self.buffer.split_to(CONNECTION_PREFACE.len());
        if &preface[..] != CONNECTION_PREFACE {
            return Err(AppError::InvalidPreface);
        }
        Ok(())
    }

    /// Reads one complete frame from the connection.
    ///
    /// Data is pulled from the stream until a frame can be parsed. A frame
    /// larger than the configured limit is an error and the connection
    /// should be closed.
    ///
    /// If the peer closes the connection on a frame boundary, `None` is
    /// returned. If it closes mid-frame, an error is returned.
    pub async fn read_frame(&mut self) -> AppResult<Option<Frame>> {
        loop {
            if let Some(frame) = Frame::parse(&mut self.buffer, self.max_frame_size)? {
                return Ok(Some(frame));
            }
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    // peer has closed the connection gracefully
                    Ok(None)
                } else {
                    // peer closed the connection while sending a frame
                    Err(
                        io::Error::new(ErrorKind::ConnectionReset, "connection reset by peer")
                            .into(),
                    )
                };
            }
        }
    }
}
