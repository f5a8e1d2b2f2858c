//! Binary event-stream frame decoder.
//!
//! Frame layout: `total_length(4) | headers_length(4) | prelude_crc(4) |
//! headers(headers_length) | payload | message_crc(4)`. Both CRCs are
//! checked independently (the prelude CRC catches a corrupt length field
//! before it's used to slice the buffer; the message CRC catches payload
//! corruption). Grounded on `crc32fast`'s streaming `Hasher` (already a
//! dependency for S3's trailing-checksum headers) applied to AWS's
//! documented `application/vnd.amazon.eventstream` framing.

use std::collections::BTreeMap;
use std::convert::TryInto;

use bytes::{Buf, Bytes, BytesMut};

const PRELUDE_LEN: usize = 8;
const CRC_LEN: usize = 4;
/// total_length + headers_length + prelude_crc + message_crc
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN + CRC_LEN;

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    ByteArray(Bytes),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub headers: BTreeMap<String, HeaderValue>,
    pub payload: Bytes,
}

impl Message {
    pub fn message_type(&self) -> Option<&str> {
        match self.headers.get(":message-type") {
            Some(HeaderValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        match self.headers.get(":event-type") {
            Some(HeaderValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn exception_type(&self) -> Option<&str> {
        match self.headers.get(":exception-type") {
            Some(HeaderValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.message_type() == Some("error")
    }

    pub fn is_exception(&self) -> bool {
        self.message_type() == Some("exception")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventStreamError {
    /// Buffer doesn't yet hold a full frame; caller should feed more bytes.
    Incomplete,
    CorruptPrelude { expected: u32, actual: u32 },
    CorruptPayload { expected: u32, actual: u32 },
    InvalidHeaderType(u8),
    Truncated,
}

impl std::fmt::Display for EventStreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EventStreamError::Incomplete => write!(f, "incomplete frame"),
            EventStreamError::CorruptPrelude { expected, actual } => {
                write!(f, "corrupt prelude: crc {:#x} != computed {:#x}", expected, actual)
            }
            EventStreamError::CorruptPayload { expected, actual } => {
                write!(f, "corrupt payload: crc {:#x} != computed {:#x}", expected, actual)
            }
            EventStreamError::InvalidHeaderType(t) => write!(f, "invalid header value type {}", t),
            EventStreamError::Truncated => write!(f, "frame truncated"),
        }
    }
}

impl std::error::Error for EventStreamError {}

/// Decodes exactly one frame from the front of `buf`, draining the
/// consumed bytes. Returns `Ok(None)` (well, `Err(Incomplete)`) rather
/// than panicking when `buf` doesn't yet hold a complete frame, so callers
/// can keep accumulating from a partial read without losing already
/// buffered bytes.
pub fn decode_message(buf: &mut BytesMut) -> Result<Message, EventStreamError> {
    if buf.len() < PRELUDE_LEN + CRC_LEN {
        return Err(EventStreamError::Incomplete);
    }

    let total_length = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let headers_length = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let prelude_crc = u32::from_be_bytes(buf[8..12].try_into().unwrap());

    let computed_prelude_crc = crc32fast::hash(&buf[0..8]);
    if computed_prelude_crc != prelude_crc {
        return Err(EventStreamError::CorruptPrelude {
            expected: prelude_crc,
            actual: computed_prelude_crc,
        });
    }

    let total_length = total_length as usize;
    if total_length < MIN_FRAME_LEN {
        return Err(EventStreamError::Truncated);
    }
    if buf.len() < total_length {
        return Err(EventStreamError::Incomplete);
    }

    let message_crc_offset = total_length - CRC_LEN;
    let message_crc = u32::from_be_bytes(buf[message_crc_offset..total_length].try_into().unwrap());
    let computed_message_crc = crc32fast::hash(&buf[0..message_crc_offset]);
    if computed_message_crc != message_crc {
        return Err(EventStreamError::CorruptPayload {
            expected: message_crc,
            actual: computed_message_crc,
        });
    }

    let headers_start = PRELUDE_LEN + CRC_LEN;
    let headers_end = headers_start + headers_length as usize;
    let headers = parse_headers(&buf[headers_start..headers_end])?;
    let payload = Bytes::copy_from_slice(&buf[headers_end..message_crc_offset]);

    buf.advance(total_length);
    Ok(Message { headers, payload })
}

fn parse_headers(mut data: &[u8]) -> Result<BTreeMap<String, HeaderValue>, EventStreamError> {
    let mut headers = BTreeMap::new();
    while !data.is_empty() {
        if data.len() < 1 {
            return Err(EventStreamError::Truncated);
        }
        let name_len = data[0] as usize;
        data = &data[1..];
        if data.len() < name_len {
            return Err(EventStreamError::Truncated);
        }
        let name = String::from_utf8_lossy(&data[..name_len]).into_owned();
        data = &data[name_len..];

        if data.is_empty() {
            return Err(EventStreamError::Truncated);
        }
        let value_type = data[0];
        data = &data[1..];

        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                require(data, 1)?;
                let v = data[0] as i8;
                data = &data[1..];
                HeaderValue::Byte(v)
            }
            3 => {
                require(data, 2)?;
                let v = i16::from_be_bytes(data[..2].try_into().unwrap());
                data = &data[2..];
                HeaderValue::Short(v)
            }
            4 => {
                require(data, 4)?;
                let v = i32::from_be_bytes(data[..4].try_into().unwrap());
                data = &data[4..];
                HeaderValue::Integer(v)
            }
            5 => {
                require(data, 8)?;
                let v = i64::from_be_bytes(data[..8].try_into().unwrap());
                data = &data[8..];
                HeaderValue::Long(v)
            }
            6 => {
                require(data, 2)?;
                let len = u16::from_be_bytes(data[..2].try_into().unwrap()) as usize;
                data = &data[2..];
                require(data, len)?;
                let v = Bytes::copy_from_slice(&data[..len]);
                data = &data[len..];
                HeaderValue::ByteArray(v)
            }
            7 => {
                require(data, 2)?;
                let len = u16::from_be_bytes(data[..2].try_into().unwrap()) as usize;
                data = &data[2..];
                require(data, len)?;
                let v = String::from_utf8_lossy(&data[..len]).into_owned();
                data = &data[len..];
                HeaderValue::String(v)
            }
            other => return Err(EventStreamError::InvalidHeaderType(other)),
        };
        headers.insert(name, value);
    }
    Ok(headers)
}

fn require(data: &[u8], len: usize) -> Result<(), EventStreamError> {
    if data.len() < len {
        Err(EventStreamError::Truncated)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(headers: &[u8], payload: &[u8]) -> BytesMut {
        let total_length = (PRELUDE_LEN + CRC_LEN + headers.len() + payload.len() + CRC_LEN) as u32;
        let headers_length = headers.len() as u32;
        let mut prelude = BytesMut::new();
        prelude.extend_from_slice(&total_length.to_be_bytes());
        prelude.extend_from_slice(&headers_length.to_be_bytes());
        let prelude_crc = crc32fast::hash(&prelude);
        prelude.extend_from_slice(&prelude_crc.to_be_bytes());
        prelude.extend_from_slice(headers);
        prelude.extend_from_slice(payload);
        let message_crc = crc32fast::hash(&prelude);
        prelude.extend_from_slice(&message_crc.to_be_bytes());
        prelude
    }

    fn string_header(name: &str, value: &str) -> Vec<u8> {
        let mut out = vec![name.len() as u8];
        out.extend_from_slice(name.as_bytes());
        out.push(7);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
        out
    }

    #[test]
    fn decodes_a_well_formed_event_message() {
        let headers = string_header(":event-type", "Records");
        let mut buf = build_frame(&headers, b"hello");
        let message = decode_message(&mut buf).unwrap();
        assert_eq!(message.event_type(), Some("Records"));
        assert_eq!(message.payload, Bytes::from_static(b"hello"));
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_buffer_is_reported_as_incomplete_not_an_error() {
        let headers = string_header(":event-type", "Records");
        let full = build_frame(&headers, b"hello");
        let mut partial = BytesMut::from(&full[..full.len() - 3]);
        assert_eq!(decode_message(&mut partial), Err(EventStreamError::Incomplete));
    }

    #[test]
    fn corrupt_payload_crc_is_detected() {
        let headers = string_header(":event-type", "Records");
        let mut buf = build_frame(&headers, b"hello");
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        match decode_message(&mut buf) {
            Err(EventStreamError::CorruptPayload { .. }) => {}
            other => panic!("expected CorruptPayload, got {:?}", other),
        }
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let headers = string_header(":event-type", "Records");
        let mut buf = build_frame(&headers, b"one");
        buf.extend_from_slice(&build_frame(&headers, b"two"));
        let first = decode_message(&mut buf).unwrap();
        let second = decode_message(&mut buf).unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"one"));
        assert_eq!(second.payload, Bytes::from_static(b"two"));
        assert!(buf.is_empty());
    }
}
