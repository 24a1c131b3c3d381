use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::codec::{build_frame, flags, FrameType, HeaderField, CONNECTION_PREFACE};
use crate::network::{Connection, FrameDispatcher, Role};
use crate::{AppError, AppResult};

/// The one request stream this client model drives per connection.
pub const REQUEST_STREAM_ID: u32 = 1;

const READ_BUFFER_SIZE: usize = 4 * 1024;
const MAX_FRAME_SIZE: usize = 16384;

/// One echo exchange to play against the server.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub authority: String,
    pub path: String,
    pub body: Bytes,
}

/// The server's answer, reassembled from its HEADERS and DATA frames.
#[derive(Debug)]
pub struct EchoReply {
    pub headers: Vec<HeaderField>,
    pub body: Bytes,
}

/// Client side of the frame engine.
///
/// Writes the preface, SETTINGS, HEADERS and DATA synchronously and
/// unconditionally, then reads frames until one carries END_STREAM;
/// exactly one complete response stream is expected per connection.
pub struct EchoClient {
    connection: Connection,
    writer: BufWriter<OwnedWriteHalf>,
    dispatcher: FrameDispatcher,
}

impl EchoClient {
    pub async fn connect(addr: &str) -> AppResult<EchoClient> {
        let socket = TcpStream::connect(addr).await?;
        let (reader, writer) = socket.into_split();
        Ok(EchoClient {
            connection: Connection::new(reader, READ_BUFFER_SIZE, MAX_FRAME_SIZE),
            writer: BufWriter::new(writer),
            dispatcher: FrameDispatcher::new(Role::Client),
        })
    }

    /// Runs one request/response exchange on stream 1 and returns the
    /// reassembled reply.
    pub async fn fetch(mut self, request: EchoRequest) -> AppResult<EchoReply> {
        self.send_request(&request).await?;
        self.read_reply().await
    }

    async fn send_request(&mut self, request: &EchoRequest) -> AppResult<()> {
        self.writer.write_all(CONNECTION_PREFACE).await?;

        let settings = build_frame(FrameType::Settings, 0, 0, &[])?;
        self.writer.write_all(&settings).await?;

        let fields = [
            HeaderField::new(":method", "POST"),
            HeaderField::new(":path", request.path.as_str()),
            HeaderField::new(":scheme", "http"),
            HeaderField::new(":authority", request.authority.as_str()),
        ];
        let block = self.dispatcher.encode_headers(&fields);
        let headers = build_frame(
            FrameType::Headers,
            flags::END_HEADERS,
            REQUEST_STREAM_ID,
            &block,
        )?;
        self.writer.write_all(&headers).await?;

        let data = build_frame(
            FrameType::Data,
            flags::END_STREAM,
            REQUEST_STREAM_ID,
            &request.body,
        )?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;

        debug!(
            "sent preface, SETTINGS, HEADERS and DATA for stream {}",
            REQUEST_STREAM_ID
        );
        Ok(())
    }

    async fn read_reply(&mut self) -> AppResult<EchoReply> {
        loop {
            let frame = match self.connection.read_frame().await? {
                Some(frame) => frame,
                None => {
                    return Err(AppError::IllegalState(
                        "server closed the connection before END_STREAM".into(),
                    ))
                }
            };

            let end_stream = frame.header.is_end_stream();
            match self.dispatcher.process_frame(frame) {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => warn!("{}", err),
                Err(err) => return Err(err),
            }

            // this client model expects exactly one complete response stream
            if end_stream {
                break;
            }
        }

        let stream = self
            .dispatcher
            .registry()
            .get(REQUEST_STREAM_ID)
            .ok_or_else(|| {
                AppError::IllegalState("response stream was never opened".into())
            })?;
        Ok(EchoReply {
            headers: stream.headers.clone(),
            body: Bytes::copy_from_slice(&stream.data),
        })
    }
}
