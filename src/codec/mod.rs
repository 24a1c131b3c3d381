//! Wire-level codecs: the 9-byte frame header format and the HPACK
//! header-block boundary.
//!
//! `frame` is a pure byte-level codec with no connection state. `hpack`
//! wraps the external compression codec; its encoder/decoder pairs are
//! stateful and strictly connection-scoped.

pub use frame::{
    build_frame, flags, Frame, FrameHeader, FrameType, CONNECTION_PREFACE, FRAME_HEADER_LEN,
    MAX_PAYLOAD_LEN,
};
pub use hpack::{HeaderField, HpackDecoder, HpackEncoder};

mod frame;
mod hpack;
