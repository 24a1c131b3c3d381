pub use app_error::{AppError, AppResult};
pub use client::{EchoClient, EchoReply, EchoRequest, REQUEST_STREAM_ID};
pub use config::{global_config, NetworkConfig, ServerConfig, GLOBAL_CONFIG};
pub use server::Server;
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod client;
mod config;
mod server;
mod shutdown;
mod tracing_config;
