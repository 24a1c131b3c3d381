use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::codec::{
    build_frame, flags, Frame, FrameHeader, FrameType, HeaderField, HpackDecoder, HpackEncoder,
};
use crate::network::stream::StreamRegistry;
use crate::{AppError, AppResult};

/// Which end of the connection the engine is driving. The server echoes
/// a closed stream back; the client only records that the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Connection lifecycle, tracked explicitly by the driver so that
/// handshake, frame processing and teardown are distinct steps rather
/// than implicit control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingPreface,
    ProcessingFrames,
    Closed,
}

/// Ready-to-write reply for a stream the peer just closed: a HEADERS
/// frame with END_HEADERS, then a DATA frame with END_STREAM carrying
/// the accumulated request body back.
#[derive(Debug, PartialEq)]
pub struct EchoResponse {
    pub stream_id: u32,
    pub headers_frame: Bytes,
    pub data_frame: Bytes,
}

/// What the read loop should do after a frame was consumed.
#[derive(Debug, PartialEq)]
pub enum Dispatch {
    /// Frame handled; keep reading.
    Continue,
    /// Client role: the response stream ended.
    StreamClosed(u32),
    /// Server role: a request stream ended, write the echo reply.
    Respond(EchoResponse),
}

/// Per-connection frame state machine.
///
/// Owns everything a connection accumulates across frames: the stream
/// registry and the HPACK encoder/decoder pair with their dynamic tables.
/// It never touches a socket; the driver feeds it decoded frames and acts
/// on the returned [`Dispatch`], which keeps partial-read and anomaly
/// cases testable without I/O.
#[derive(Debug)]
pub struct FrameDispatcher {
    role: Role,
    registry: StreamRegistry,
    decoder: HpackDecoder,
    encoder: HpackEncoder,
}

impl FrameDispatcher {
    pub fn new(role: Role) -> FrameDispatcher {
        FrameDispatcher {
            role,
            registry: StreamRegistry::new(),
            decoder: HpackDecoder::new(),
            encoder: HpackEncoder::new(),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Encode an outbound header list through this connection's encoder,
    /// so every block on the connection shares one dynamic table.
    pub fn encode_headers(&mut self, fields: &[HeaderField]) -> Vec<u8> {
        self.encoder.encode(fields)
    }

    /// Dispatch one frame by type.
    ///
    /// `UnknownStream` and `HeaderDecode` errors only discard the frame's
    /// effect (`AppError::is_recoverable`); `MalformedFrame` terminates
    /// the connection.
    pub fn process_frame(&mut self, frame: Frame) -> AppResult<Dispatch> {
        let header = frame.header;
        match header.frame_type {
            FrameType::Settings => {
                if header.is_ack() {
                    debug!("received SETTINGS ACK (stream={})", header.stream_id);
                } else {
                    // parameters are accepted but not negotiated
                    debug!(
                        "received SETTINGS frame with {} bytes (stream={})",
                        header.length, header.stream_id
                    );
                }
                Ok(Dispatch::Continue)
            }
            FrameType::Ping => {
                // no PING ACK is sent back
                debug!("received PING frame: {:x} (ack={})", frame.payload, header.is_ack());
                Ok(Dispatch::Continue)
            }
            FrameType::Data => self.on_data(header, frame.payload),
            FrameType::Headers => self.on_headers(header, frame.payload),
            FrameType::RstStream => self.on_rst_stream(header, frame.payload),
            FrameType::PushPromise => self.on_push_promise(header, frame.payload),
            FrameType::Unknown(code) => {
                debug!(
                    "received unknown frame type 0x{:x} (len={})",
                    code, header.length
                );
                Ok(Dispatch::Continue)
            }
        }
    }

    fn on_data(&mut self, header: FrameHeader, payload: Bytes) -> AppResult<Dispatch> {
        let stream = self
            .registry
            .get_mut(header.stream_id)
            .ok_or(AppError::UnknownStream(header.stream_id))?;
        stream.append_data(&payload);
        debug!(
            "stream {}: received DATA (len={})",
            header.stream_id,
            payload.len()
        );
        if !header.is_end_stream() {
            return Ok(Dispatch::Continue);
        }
        stream.closed = true;
        info!(
            "stream {}: END_STREAM received, {} body bytes",
            header.stream_id,
            stream.data.len()
        );
        match self.role {
            Role::Server => Ok(Dispatch::Respond(self.build_echo(header.stream_id)?)),
            Role::Client => Ok(Dispatch::StreamClosed(header.stream_id)),
        }
    }

    fn on_headers(&mut self, header: FrameHeader, payload: Bytes) -> AppResult<Dispatch> {
        // PADDED and PRIORITY flag bytes are not parsed; simple clients
        // never set them and the layout under those flags is untested
        let fields = self.decoder.decode(&payload)?;
        debug!(
            "stream {}: received HEADERS ({} fields)",
            header.stream_id,
            fields.len()
        );
        for field in &fields {
            debug!("  {}: {}", field.name, field.value);
        }
        self.registry.open(header.stream_id, fields);
        Ok(Dispatch::Continue)
    }

    fn on_rst_stream(&mut self, header: FrameHeader, payload: Bytes) -> AppResult<Dispatch> {
        if payload.len() < 4 {
            return Err(AppError::MalformedFrame(format!(
                "RST_STREAM payload of {} bytes, need at least 4",
                payload.len()
            )));
        }
        let error_code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        // no local stream state changes on reset
        info!(
            "stream {} reset by peer, error code 0x{:x}",
            header.stream_id, error_code
        );
        Ok(Dispatch::Continue)
    }

    fn on_push_promise(&mut self, header: FrameHeader, payload: Bytes) -> AppResult<Dispatch> {
        if payload.len() < 4 {
            return Err(AppError::MalformedFrame(format!(
                "PUSH_PROMISE payload of {} bytes, need at least 4",
                payload.len()
            )));
        }
        let promised_id =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let fields = self.decoder.decode(&payload[4..])?;
        info!(
            "stream {}: PUSH_PROMISE for stream {}",
            header.stream_id, promised_id
        );
        for field in &fields {
            debug!("  {}: {}", field.name, field.value);
        }
        Ok(Dispatch::Continue)
    }

    /// Assembles the echo reply for a closed stream: fixed 200/text-plain
    /// response headers plus the request body played back verbatim.
    fn build_echo(&mut self, stream_id: u32) -> AppResult<EchoResponse> {
        let body: BytesMut = match self.registry.get(stream_id) {
            Some(stream) => stream.data.clone(),
            None => return Err(AppError::UnknownStream(stream_id)),
        };
        let fields = [
            HeaderField::new(":status", "200"),
            HeaderField::new("content-type", "text/plain"),
        ];
        let block = self.encoder.encode(&fields);
        let headers_frame = build_frame(FrameType::Headers, flags::END_HEADERS, stream_id, &block)?;
        let data_frame = build_frame(FrameType::Data, flags::END_STREAM, stream_id, &body)?;
        Ok(EchoResponse {
            stream_id,
            headers_frame,
            data_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FRAME_HEADER_LEN;

    fn frame(frame_type: FrameType, frame_flags: u8, stream_id: u32, payload: &[u8]) -> Frame {
        Frame {
            header: FrameHeader {
                length: payload.len() as u32,
                frame_type,
                flags: frame_flags,
                stream_id,
            },
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn request_block() -> Vec<u8> {
        HpackEncoder::new().encode(&[
            HeaderField::new(":method", "POST"),
            HeaderField::new(":path", "/"),
        ])
    }

    #[test]
    fn headers_then_data_echoes_the_body() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);

        let dispatch = dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &request_block()))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Continue);

        let echo = match dispatcher
            .process_frame(frame(
                FrameType::Data,
                flags::END_STREAM,
                1,
                b"Hello Serverrrr!",
            ))
            .unwrap()
        {
            Dispatch::Respond(echo) => echo,
            other => panic!("expected Respond, got {:?}", other),
        };

        let stream = dispatcher.registry().get(1).unwrap();
        assert!(stream.closed);
        assert_eq!(&stream.data[..], b"Hello Serverrrr!");
        assert_eq!(stream.headers[0], HeaderField::new(":method", "POST"));

        // response HEADERS frame: END_HEADERS on the request's stream
        let head = FrameHeader::decode(&echo.headers_frame[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(head.frame_type, FrameType::Headers);
        assert_eq!(head.stream_id, 1);
        assert!(head.is_end_headers());
        let fields = HpackDecoder::new()
            .decode(&echo.headers_frame[FRAME_HEADER_LEN..])
            .unwrap();
        assert_eq!(
            fields,
            vec![
                HeaderField::new(":status", "200"),
                HeaderField::new("content-type", "text/plain"),
            ]
        );

        // response DATA frame: END_STREAM, body played back unchanged
        let head = FrameHeader::decode(&echo.data_frame[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(head.frame_type, FrameType::Data);
        assert!(head.is_end_stream());
        assert_eq!(&echo.data_frame[FRAME_HEADER_LEN..], b"Hello Serverrrr!");
    }

    #[test]
    fn data_for_an_unknown_stream_is_recoverable() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);

        let err = dispatcher
            .process_frame(frame(FrameType::Data, flags::END_STREAM, 7, b"orphan"))
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownStream(7)));
        assert!(err.is_recoverable());
        assert!(dispatcher.registry().is_empty());

        // the engine keeps working after the anomaly
        dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &request_block()))
            .unwrap();
        let dispatch = dispatcher
            .process_frame(frame(FrameType::Data, flags::END_STREAM, 1, b"ok"))
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Respond(_)));
    }

    #[test]
    fn client_role_closes_streams_without_echoing() {
        let mut dispatcher = FrameDispatcher::new(Role::Client);
        dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &request_block()))
            .unwrap();
        let dispatch = dispatcher
            .process_frame(frame(FrameType::Data, flags::END_STREAM, 1, b"reply"))
            .unwrap();
        assert_eq!(dispatch, Dispatch::StreamClosed(1));
        assert!(dispatcher.registry().get(1).unwrap().closed);
    }

    #[test]
    fn data_before_end_stream_keeps_accumulating() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);
        dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &request_block()))
            .unwrap();
        let dispatch = dispatcher
            .process_frame(frame(FrameType::Data, 0, 1, b"Hello "))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Continue);
        let dispatch = dispatcher
            .process_frame(frame(FrameType::Data, flags::END_STREAM, 1, b"Serverrrr!"))
            .unwrap();
        match dispatch {
            Dispatch::Respond(echo) => {
                assert_eq!(&echo.data_frame[FRAME_HEADER_LEN..], b"Hello Serverrrr!");
            }
            other => panic!("expected Respond, got {:?}", other),
        }
    }

    #[test]
    fn short_rst_stream_is_malformed() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);
        let err = dispatcher
            .process_frame(frame(FrameType::RstStream, 0, 1, &[0, 0, 1]))
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedFrame(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn rst_stream_with_error_code_is_logged_only() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);
        dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &request_block()))
            .unwrap();
        let dispatch = dispatcher
            .process_frame(frame(FrameType::RstStream, 0, 1, &[0, 0, 0, 1]))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Continue);
        // reset mutates no stream state
        assert!(!dispatcher.registry().get(1).unwrap().closed);
    }

    #[test]
    fn control_frames_are_logged_only() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);
        for f in [
            frame(FrameType::Settings, 0, 0, &[]),
            frame(FrameType::Settings, flags::ACK, 0, &[]),
            frame(FrameType::Ping, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]),
            frame(FrameType::Unknown(0x9), 0, 1, b"continuation"),
        ] {
            assert_eq!(dispatcher.process_frame(f).unwrap(), Dispatch::Continue);
        }
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn push_promise_decodes_the_promised_header_block() {
        let mut dispatcher = FrameDispatcher::new(Role::Client);
        // promised stream ID with the reserved bit set on the wire
        let mut payload = 0x8000_0002u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&request_block());
        let dispatch = dispatcher
            .process_frame(frame(FrameType::PushPromise, flags::END_HEADERS, 1, &payload))
            .unwrap();
        assert_eq!(dispatch, Dispatch::Continue);

        let err = dispatcher
            .process_frame(frame(FrameType::PushPromise, 0, 1, &[0, 0]))
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedFrame(_)));
    }

    #[test]
    fn garbage_header_block_is_recoverable() {
        let mut dispatcher = FrameDispatcher::new(Role::Server);
        // 0x80 is an indexed field with index 0, which HPACK forbids
        let err = dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 1, &[0x80]))
            .unwrap_err();
        assert!(matches!(err, AppError::HeaderDecode(_)));
        assert!(err.is_recoverable());
        assert!(dispatcher.registry().is_empty());

        // the connection keeps processing frames afterwards
        dispatcher
            .process_frame(frame(FrameType::Headers, flags::END_HEADERS, 3, &request_block()))
            .unwrap();
        assert_eq!(dispatcher.registry().len(), 1);
    }
}
