use std::fmt;

use crate::{AppError, AppResult};

/// One decoded header line. Order matters: pseudo-headers come first and
/// repeated names are legal, so lists of these are never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Decoder side of the header-block codec.
///
/// Wraps `fluke_hpack::Decoder`, whose dynamic table accumulates state
/// across blocks. Exactly one instance must serve all frames of one
/// connection direction; a fresh decoder per frame cannot resolve
/// dynamic-table references made by earlier blocks.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    pub fn decode(&mut self, block: &[u8]) -> AppResult<Vec<HeaderField>> {
        let pairs = self
            .inner
            .decode(block)
            .map_err(|e| AppError::HeaderDecode(format!("{:?}", e)))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                HeaderField::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// Encoder side of the header-block codec, same lifetime rule as the
/// decoder: one instance per connection direction, reused across frames.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
        }
    }

    pub fn encode(&mut self, fields: &[HeaderField]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = fields
            .iter()
            .map(|f| (f.name.as_bytes(), f.value.as_bytes()))
            .collect();
        self.inner.encode(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_static_indexed_headers() {
        let mut decoder = HpackDecoder::new();
        // 0x82 = :method: GET, 0x86 = :scheme: http, 0x84 = :path: /
        let fields = decoder.decode(&[0x82, 0x86, 0x84]).unwrap();
        assert_eq!(
            fields,
            vec![
                HeaderField::new(":method", "GET"),
                HeaderField::new(":scheme", "http"),
                HeaderField::new(":path", "/"),
            ]
        );
    }

    #[test]
    fn request_header_round_trip() {
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();

        let fields = vec![
            HeaderField::new(":method", "POST"),
            HeaderField::new(":path", "/"),
            HeaderField::new(":scheme", "http"),
            HeaderField::new(":authority", "localhost"),
        ];
        let block = encoder.encode(&fields);
        assert_eq!(decoder.decode(&block).unwrap(), fields);
    }

    #[test]
    fn one_decoder_serves_consecutive_blocks() {
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();

        let fields = vec![HeaderField::new("x-trace-id", "abc123")];
        let first = encoder.encode(&fields);
        let second = encoder.encode(&fields);
        assert_eq!(decoder.decode(&first).unwrap(), fields);
        assert_eq!(decoder.decode(&second).unwrap(), fields);
    }

    #[test]
    fn fresh_decoder_cannot_resolve_dynamic_references() {
        // literal with incremental indexing: inserts x-trace-id into the
        // dynamic table at index 62
        let mut first = vec![0x40, 0x0a];
        first.extend_from_slice(b"x-trace-id");
        first.push(0x06);
        first.extend_from_slice(b"abc123");
        // indexed field referencing dynamic-table index 62
        let second = [0xBE];

        let mut shared = HpackDecoder::new();
        let expected = vec![HeaderField::new("x-trace-id", "abc123")];
        assert_eq!(shared.decode(&first).unwrap(), expected);
        assert_eq!(shared.decode(&second).unwrap(), expected);

        // a decoder that never saw the first block has no table entry 62;
        // this is the expected incompatibility, not a defect
        let mut fresh = HpackDecoder::new();
        let err = fresh.decode(&second).unwrap_err();
        assert!(matches!(err, AppError::HeaderDecode(_)));
    }
}
