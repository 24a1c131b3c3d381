//! Per-connection protocol machinery.
//!
//! # Architecture
//!
//! Built on tokio's async I/O primitives:
//! - `Connection`: buffered frame reads off one TCP read half
//! - `StreamRegistry` / `StreamState`: stream bookkeeping, owned by
//!   exactly one connection
//! - `FrameDispatcher`: the sans-I/O state machine dispatching decoded
//!   frames and assembling echo replies
//!
//! Frame processing within a connection is strictly sequential; the read
//! loop is the only consumer of the socket, so none of this is locked.

pub use connection::Connection;
pub use dispatcher::{Dispatch, EchoResponse, FrameDispatcher, Phase, Role};
pub use stream::{StreamRegistry, StreamState};

mod connection;
mod dispatcher;
mod stream;
