use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use crate::codec::HeaderField;

/// Per-stream bookkeeping within one connection: the decoded request
/// headers, the body accumulated from DATA frames, and the END_STREAM mark.
#[derive(Debug)]
pub struct StreamState {
    pub id: u32,
    pub headers: Vec<HeaderField>,
    pub data: BytesMut,
    pub closed: bool,
}

impl StreamState {
    pub fn new(id: u32, headers: Vec<HeaderField>) -> StreamState {
        StreamState {
            id,
            headers,
            data: BytesMut::new(),
            closed: false,
        }
    }

    /// DATA payloads are append-only; nothing ever rewrites earlier bytes.
    pub fn append_data(&mut self, chunk: &[u8]) {
        self.data.put_slice(chunk);
    }
}

/// Maps stream IDs to their state for the lifetime of exactly one
/// connection. Constructed per connection and owned by its handler;
/// never shared across connections, so it needs no locking.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<u32, StreamState>,
}

impl StreamRegistry {
    pub fn new() -> StreamRegistry {
        StreamRegistry::default()
    }

    /// A stream exists from the moment its HEADERS frame is decoded.
    /// Re-sent HEADERS for a live ID replace the previous state.
    pub fn open(&mut self, id: u32, headers: Vec<HeaderField>) {
        self.streams.insert(id, StreamState::new(id, headers));
    }

    pub fn get(&self, id: u32) -> Option<&StreamState> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut StreamState> {
        self.streams.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_lifecycle() {
        let mut registry = StreamRegistry::new();
        assert!(registry.is_empty());

        registry.open(1, vec![HeaderField::new(":method", "POST")]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(3).is_none());

        let stream = registry.get_mut(1).unwrap();
        stream.append_data(b"Hello ");
        stream.append_data(b"Serverrrr!");
        stream.closed = true;

        let stream = registry.get(1).unwrap();
        assert_eq!(&stream.data[..], b"Hello Serverrrr!");
        assert!(stream.closed);
        assert_eq!(stream.headers[0], HeaderField::new(":method", "POST"));
    }

    #[test]
    fn reopening_a_stream_replaces_its_state() {
        let mut registry = StreamRegistry::new();
        registry.open(1, vec![HeaderField::new(":path", "/a")]);
        registry.get_mut(1).unwrap().append_data(b"old");

        registry.open(1, vec![HeaderField::new(":path", "/b")]);
        let stream = registry.get(1).unwrap();
        assert!(stream.data.is_empty());
        assert_eq!(stream.headers[0].value, "/b");
    }
}
