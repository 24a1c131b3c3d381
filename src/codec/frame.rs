use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// Every HTTP/2 frame starts with a fixed 9-byte header.
pub const FRAME_HEADER_LEN: usize = 9;

/// The 24 bytes a client must send before any framed data.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Largest payload the 3-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

/// Frame flag bits. END_STREAM and ACK share a bit; which one applies
/// depends on the frame type carrying it.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
}

/// The frame types this engine consumes or produces. Every unassigned
/// code decodes to `Unknown` and is accepted on read, never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    Unknown(u8),
}

impl FrameType {
    pub fn from_code(code: u8) -> FrameType {
        match code {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            other => FrameType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::Unknown(code) => *code,
        }
    }
}

/// Decoded form of the 9-byte frame header: 24-bit payload length,
/// 8-bit type, 8-bit flags, 31-bit stream ID. The reserved high bit of
/// the stream-ID word is masked off on decode and never written on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn decode(raw: &[u8]) -> AppResult<FrameHeader> {
        if raw.len() < FRAME_HEADER_LEN {
            return Err(AppError::ShortRead(format!(
                "frame header needs {} bytes, got {}",
                FRAME_HEADER_LEN,
                raw.len()
            )));
        }
        let length = u32::from(raw[0]) << 16 | u32::from(raw[1]) << 8 | u32::from(raw[2]);
        let stream_id = u32::from_be_bytes([raw[5], raw[6], raw[7], raw[8]]) & 0x7FFF_FFFF;
        Ok(FrameHeader {
            length,
            frame_type: FrameType::from_code(raw[3]),
            flags: raw[4],
            stream_id,
        })
    }

    pub fn encode(&self, payload_len: usize) -> AppResult<[u8; FRAME_HEADER_LEN]> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(AppError::FrameTooLarge(payload_len));
        }
        let mut head = [0u8; FRAME_HEADER_LEN];
        head[0] = (payload_len >> 16) as u8;
        head[1] = (payload_len >> 8) as u8;
        head[2] = payload_len as u8;
        head[3] = self.frame_type.code();
        head[4] = self.flags;
        head[5..9].copy_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
        Ok(head)
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    /// Meaningful on SETTINGS and PING only.
    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
}

/// Assemble a complete outbound frame, header plus payload.
pub fn build_frame(
    frame_type: FrameType,
    frame_flags: u8,
    stream_id: u32,
    payload: &[u8],
) -> AppResult<Bytes> {
    let header = FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags: frame_flags,
        stream_id,
    };
    let head = header.encode(payload.len())?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_slice(&head);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// One inbound frame: decoded header plus exactly `header.length` payload bytes.
/// Constructed per read and discarded once dispatched, never persisted.
#[derive(Debug)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn check(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<()> {
        if buffer.remaining() < FRAME_HEADER_LEN {
            return Err(Incomplete);
        }
        let length =
            (usize::from(buffer[0]) << 16) | (usize::from(buffer[1]) << 8) | usize::from(buffer[2]);
        if length > max_frame_size {
            return Err(AppError::MalformedFrame(format!(
                "frame of length {} is too large",
                length
            )));
        }
        if buffer.remaining() < FRAME_HEADER_LEN + length {
            buffer.reserve(FRAME_HEADER_LEN + length);
            return Err(Incomplete);
        }
        Ok(())
    }

    pub fn parse(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<Option<Frame>> {
        // perform a check to ensure we have enough data
        match Frame::check(buffer, max_frame_size) {
            Ok(_) => {
                let head = buffer.split_to(FRAME_HEADER_LEN);
                let header = FrameHeader::decode(&head[..])?;
                let payload = buffer.split_to(header.length as usize).freeze();
                Ok(Some(Frame { header, payload }))
            }
            Err(Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
