use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::codec::{build_frame, Frame, FrameType, FRAME_HEADER_LEN};
use crate::network::{Connection, Dispatch, FrameDispatcher, Phase, Role};
use crate::{global_config, AppError, AppResult, Shutdown};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// h2c echo server: accepts connections and hands each one to its own
/// `ConnectionHandler` task. Stream state, HPACK tables and the read
/// buffer all live inside the handler, so connections share nothing.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        limit_connections: Arc<Semaphore>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        Server {
            listener,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
        }
    }

    /// Binds from the global config and serves until ctrl-c.
    ///
    /// Graceful shutdown sequence:
    /// 1. The accept loop is cancelled by the ctrl-c branch of the select.
    /// 2. Each `connection handler` exits its read loop when the shutdown
    ///    broadcast arrives; in-flight frames finish first.
    /// 3. Once every handler has dropped its `shutdown_complete_tx` clone,
    ///    the final `recv` below returns and the process can exit.
    pub async fn start() -> AppResult<()> {
        let network = &global_config().network;
        let listen_address = format!("{}:{}", network.ip, network.port);

        let listener = TcpListener::bind(&listen_address).await.map_err(|err| {
            AppError::DetailedIoError(format!(
                "failed to bind server to address {}: {}",
                listen_address, err
            ))
        })?;
        info!("listening for h2c on {}", listen_address);

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        let server = Server::new(
            listener,
            Arc::new(Semaphore::new(network.max_connection)),
            notify_shutdown.clone(),
            shutdown_complete_tx,
        );

        tokio::select! {
            res = server.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "failed to accept");
                }
            }
            _ = signal::ctrl_c() => {
                info!("received shutdown signal");
            }
        }

        drop(server);
        let _ = notify_shutdown.send(());
        shutdown_complete_rx.recv().await;
        info!("server shutdown complete");
        Ok(())
    }

    /// Accept loop: one permit and one spawned handler per connection.
    pub async fn run(&self) -> AppResult<()> {
        let network = &global_config().network;

        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            let socket = self.accept().await?;
            let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
            debug!("accepted connection {}", connection_id);

            let (reader, writer) = socket.into_split();

            let mut handler = ConnectionHandler {
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
                notify_shutdown: self.notify_shutdown.clone(),
                connection_id,
                connection: Connection::new(
                    reader,
                    network.conn_read_buffer_size,
                    network.max_frame_size,
                ),
                writer: BufWriter::new(writer),
                dispatcher: FrameDispatcher::new(Role::Server),
                phase: Phase::AwaitingPreface,
            };

            tokio::spawn(async move {
                if let Err(err) = handler.handle_connection().await {
                    error!("connection {} error: {}", handler.connection_id, err);
                }
                // whether gracefully or unexpectedly closed, release connection
                drop(permit);
            });
        }
    }

    async fn accept(&self) -> AppResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::DetailedIoError(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

/// Handler for each connection, driving the explicit phase machine:
/// awaiting preface -> processing frames -> closed.
struct ConnectionHandler {
    notify_shutdown: broadcast::Sender<()>,
    _shutdown_complete_tx: mpsc::Sender<()>,
    connection_id: u64,
    connection: Connection,
    writer: BufWriter<OwnedWriteHalf>,
    dispatcher: FrameDispatcher,
    phase: Phase,
}

impl ConnectionHandler {
    async fn handle_connection(&mut self) -> AppResult<()> {
        let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());

        while self.phase != Phase::Closed {
            match self.phase {
                Phase::AwaitingPreface => self.handshake().await?,
                Phase::ProcessingFrames => {
                    // read one frame; a graceful peer close returns None,
                    // an unexpected close mid-frame returns Err
                    let maybe_frame = tokio::select! {
                        res = self.connection.read_frame() => res?,
                        _ = shutdown.recv() => {
                            debug!(
                                "connection {} exits read loop on shutdown signal",
                                self.connection_id
                            );
                            self.phase = Phase::Closed;
                            continue;
                        }
                    };

                    match maybe_frame {
                        Some(frame) => self.dispatch(frame).await?,
                        None => self.phase = Phase::Closed,
                    }
                }
                Phase::Closed => {}
            }
        }
        debug!("connection {} closed", self.connection_id);

        Ok(())
    }

    /// Validates the 24-byte preface, then announces our (empty) settings
    /// before any frame is read.
    async fn handshake(&mut self) -> AppResult<()> {
        self.connection.read_preface().await?;
        debug!(
            "connection {}: received valid HTTP/2 connection preface",
            self.connection_id
        );

        let settings = build_frame(FrameType::Settings, 0, 0, &[])?;
        self.writer.write_all(&settings).await?;
        self.writer.flush().await?;

        self.phase = Phase::ProcessingFrames;
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> AppResult<()> {
        match self.dispatcher.process_frame(frame) {
            Ok(Dispatch::Respond(echo)) => {
                debug!(
                    "stream {}: echoing {} body bytes",
                    echo.stream_id,
                    echo.data_frame.len() - FRAME_HEADER_LEN
                );
                self.writer.write_all(&echo.headers_frame).await?;
                self.writer.write_all(&echo.data_frame).await?;
                self.writer.flush().await?;
            }
            Ok(_) => {}
            // the offending frame is discarded, the connection lives on
            Err(err) if err.is_recoverable() => {
                warn!("connection {}: {}", self.connection_id, err);
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        debug!("connection handler dropped");
    }
}
