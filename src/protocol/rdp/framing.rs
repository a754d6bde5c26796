//! Wire framing for the Firefox remote debugging protocol.
//!
//! Every packet on the wire is `<decimal-byte-length>:<json-bytes>`,
//! where the length counts exactly the JSON payload that follows:
//!
//! ```text
//! 31:{"to":"root","type":"getRoot"}
//! ```
//!
//! TCP delivers partial frames, so decoding is a streaming state
//! machine over an accumulating buffer: scan for the first `:` to learn
//! the length, wait until the buffer holds that many further bytes,
//! slice the payload out, and loop. Unconsumed trailing bytes are never
//! discarded between frames.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted length header, digits only.
///
/// Ten digits cover every length below the payload cap; a longer run of
/// digits without a `:` is garbage, not a slow frame.
const MAX_HEADER_DIGITS: usize = 10;

/// Largest accepted payload. Real packets are kilobytes; anything near
/// this bound is a desynchronized stream.
const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes one JSON value as a wire frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if the value cannot be serialized.
pub fn build_frame(value: &Value) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(value)?;
    let mut frame = payload.len().to_string().into_bytes();
    frame.push(b':');
    frame.extend_from_slice(&payload);
    Ok(frame)
}

// ============================================================================
// FrameDecoder
// ============================================================================

/// Streaming decoder over an accumulating byte buffer.
///
/// Feed arbitrary chunks with [`push`](Self::push); drain complete
/// frames with [`next_frame`](Self::next_frame). Split points in the
/// input never affect the decoded result.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes received but not yet consumed.
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes to the buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the number of buffered, unconsumed bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete frame, if the buffer holds one.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] on a malformed header or oversized
    /// length, and [`Error::Json`] on an unparseable payload. Both mean
    /// the stream is desynchronized and the connection must be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Value>> {
        let Some(colon) = self.find_header_colon()? else {
            return Ok(None);
        };

        let header = std::str::from_utf8(&self.buffer[..colon])
            .map_err(|_| Error::frame("Non-ASCII length header"))?;
        let length: usize = header
            .parse()
            .map_err(|_| Error::frame(format!("Invalid length header: {header:?}")))?;

        if length > MAX_PAYLOAD_BYTES {
            return Err(Error::frame(format!(
                "Payload length {length} exceeds cap of {MAX_PAYLOAD_BYTES}"
            )));
        }

        let frame_end = colon + 1 + length;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&self.buffer[colon + 1..frame_end])?;

        // Keep whatever follows the frame for the next call.
        self.buffer.drain(..frame_end);

        Ok(Some(value))
    }

    /// Locates the header-terminating `:`, validating digits on the way.
    fn find_header_colon(&self) -> Result<Option<usize>> {
        for (index, byte) in self.buffer.iter().enumerate() {
            match byte {
                b':' if index > 0 => return Ok(Some(index)),
                b':' => return Err(Error::frame("Empty length header")),
                b'0'..=b'9' if index < MAX_HEADER_DIGITS => {}
                _ => {
                    return Err(Error::frame(format!(
                        "Malformed length header byte 0x{byte:02x} at offset {index}"
                    )));
                }
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().expect("decode") {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_build_frame_shape() {
        let frame = build_frame(&json!({"to":"root","type":"getRoot"})).expect("build");
        let text = String::from_utf8(frame).expect("utf8");
        let (header, payload) = text.split_once(':').expect("colon");
        assert_eq!(header.parse::<usize>().expect("len"), payload.len());
    }

    #[test]
    fn test_round_trip_single_frame() {
        let value = json!({"from": "root", "applicationType": "browser"});
        let mut decoder = FrameDecoder::new();
        decoder.push(&build_frame(&value).expect("build"));

        assert_eq!(decoder.next_frame().expect("decode"), Some(value));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_delivery_waits() {
        let frame = build_frame(&json!({"type": "tabListChanged"})).expect("build");
        let mut decoder = FrameDecoder::new();

        decoder.push(&frame[..3]);
        assert_eq!(decoder.next_frame().expect("decode"), None);

        decoder.push(&frame[3..frame.len() - 1]);
        assert_eq!(decoder.next_frame().expect("decode"), None);

        decoder.push(&frame[frame.len() - 1..]);
        assert!(decoder.next_frame().expect("decode").is_some());
    }

    #[test]
    fn test_back_to_back_frames_in_one_push() {
        let a = json!({"from": "root", "type": "addonListChanged"});
        let b = json!({"from": "conn0.tab1", "title": "Welcome"});

        let mut bytes = build_frame(&a).expect("build a");
        bytes.extend(build_frame(&b).expect("build b"));

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert_eq!(decode_all(&mut decoder), vec![a, b]);
    }

    #[test]
    fn test_trailing_bytes_preserved_between_frames() {
        let a = json!({"seq": 1});
        let b = json!({"seq": 2});

        let mut bytes = build_frame(&a).expect("build a");
        bytes.extend(build_frame(&b).expect("build b"));

        // Split mid-way through the second frame's payload.
        let split = bytes.len() - 4;
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..split]);

        assert_eq!(decoder.next_frame().expect("decode"), Some(a));
        assert!(decoder.buffered() > 0, "second frame prefix retained");
        assert_eq!(decoder.next_frame().expect("decode"), None);

        decoder.push(&bytes[split..]);
        assert_eq!(decoder.next_frame().expect("decode"), Some(b));
    }

    #[test]
    fn test_malformed_header_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"hello:{}");
        assert!(decoder.next_frame().is_err());
    }

    #[test]
    fn test_empty_header_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b":{}");
        assert!(decoder.next_frame().is_err());
    }

    #[test]
    fn test_oversized_length_is_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"9999999999:");
        assert!(decoder.next_frame().is_err());
    }

    #[test]
    fn test_unicode_payload_length_counts_bytes() {
        let value = json!({"title": "日本語タイトル"});
        let mut decoder = FrameDecoder::new();
        decoder.push(&build_frame(&value).expect("build"));
        assert_eq!(decoder.next_frame().expect("decode"), Some(value));
    }

    mod properties {
        use super::*;

        use proptest::prelude::*;

        /// Arbitrary JSON-ish payloads: nested maps of strings/numbers.
        fn arb_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                any::<bool>().prop_map(Value::from),
                any::<i64>().prop_map(Value::from),
                "[a-zA-Z0-9 _:/.-]{0,40}".prop_map(Value::from),
            ];
            leaf.prop_recursive(3, 32, 8, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                    prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                        .prop_map(|m| Value::from(serde_json::Map::from_iter(m))),
                ]
            })
        }

        proptest! {
            #[test]
            fn round_trip(values in prop::collection::vec(arb_value(), 1..5)) {
                let mut bytes = Vec::new();
                for value in &values {
                    bytes.extend(build_frame(value).expect("build"));
                }

                let mut decoder = FrameDecoder::new();
                decoder.push(&bytes);
                prop_assert_eq!(decode_all(&mut decoder), values);
            }

            #[test]
            fn split_delivery_matches_single_shot(
                values in prop::collection::vec(arb_value(), 1..4),
                chunk in 1usize..7,
            ) {
                let mut bytes = Vec::new();
                for value in &values {
                    bytes.extend(build_frame(value).expect("build"));
                }

                let mut split_decoder = FrameDecoder::new();
                let mut split_frames = Vec::new();
                for piece in bytes.chunks(chunk) {
                    split_decoder.push(piece);
                    while let Some(frame) = split_decoder.next_frame().expect("decode") {
                        split_frames.push(frame);
                    }
                }

                prop_assert_eq!(split_frames, values);
                prop_assert_eq!(split_decoder.buffered(), 0);
            }
        }
    }
}
