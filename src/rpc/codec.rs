//! Binary RPC wire codec.
//!
//! # Frame layout
//! ```text
//! +------------+----------------------+------------------------+
//! | flag (u8)  | length (u32, BE)     | MessagePack payload    |
//! +------------+----------------------+------------------------+
//! ```
//! Only uncompressed frames (`flag == 0`) are accepted.

use axum::http::{HeaderMap, HeaderValue};
use bytes::{BufMut, Bytes, BytesMut};
use url::form_urlencoded;

use crate::rpc::{Code, Message, Status};

/// Content type announced by binary RPC requests and responses.
pub const CONTENT_TYPE: &str = "application/grpc+msgpack";

/// Prefix the multiplexer uses to recognise binary RPC traffic.
pub const CONTENT_TYPE_PREFIX: &str = "application/grpc";

/// Header or trailer carrying the numeric call status.
pub const GRPC_STATUS: &str = "grpc-status";

/// Header or trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Length of the frame prefix.
pub const HEADER_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("compressed frames are not supported")]
    Compressed,

    #[error("trailing bytes after frame: {0}")]
    TrailingBytes(usize),

    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl From<CodecError> for Status {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::TooLarge { .. } => Status::resource_exhausted(err.to_string()),
            CodecError::Compressed => Status::unimplemented(err.to_string()),
            CodecError::Encode(_) => Status::internal(err.to_string()),
            _ => Status::invalid_argument(err.to_string()),
        }
    }
}

/// Serialize a message and wrap it in a single frame.
pub fn encode_message(message: &Message) -> Result<Bytes, CodecError> {
    let payload = rmp_serde::to_vec(message)?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(0);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Decode exactly one frame from `body`. `limit` bounds the payload size.
pub fn decode_message(body: &[u8], limit: Option<usize>) -> Result<Message, CodecError> {
    if body.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: body.len(),
        });
    }
    if body[0] != 0 {
        return Err(CodecError::Compressed);
    }

    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    if let Some(limit) = limit {
        if len > limit {
            return Err(CodecError::TooLarge { size: len, limit });
        }
    }

    let payload = &body[HEADER_LEN..];
    if payload.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: payload.len(),
        });
    }
    if payload.len() > len {
        return Err(CodecError::TrailingBytes(payload.len() - len));
    }

    Ok(rmp_serde::from_slice(payload)?)
}

/// Write `code` and `message` into a header or trailer map.
pub fn write_status(headers: &mut HeaderMap, code: Code, message: &str) {
    headers.insert(GRPC_STATUS, HeaderValue::from(code.as_i32()));
    if !message.is_empty() {
        let encoded: String = form_urlencoded::byte_serialize(message.as_bytes()).collect();
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            headers.insert(GRPC_MESSAGE, value);
        }
    }
}

/// Read a call status from a header or trailer map, if one is present.
pub fn read_status(headers: &HeaderMap) -> Option<Status> {
    let code = headers
        .get(GRPC_STATUS)?
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .map(Code::from_i32)
        .unwrap_or(Code::Unknown);
    let message = headers
        .get(GRPC_MESSAGE)
        .and_then(|v| form_urlencoded::parse(v.as_bytes()).next())
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default();
    Some(Status::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_header_carries_payload_length() {
        let frame = encode_message(&json!({"name": "prod"})).unwrap();
        assert_eq!(frame[0], 0);
        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(len, frame.len() - HEADER_LEN);

        let decoded = decode_message(&frame, None).unwrap();
        assert_eq!(decoded, json!({"name": "prod"}));
    }

    #[test]
    fn rejects_short_and_compressed_frames() {
        assert!(matches!(
            decode_message(&[0, 0, 0], None),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            decode_message(&[1, 0, 0, 0, 0], None),
            Err(CodecError::Compressed)
        ));
    }

    #[test]
    fn enforces_size_limit() {
        let frame = encode_message(&json!({"blob": "x".repeat(64)})).unwrap();
        let err = decode_message(&frame, Some(16)).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge { limit: 16, .. }));
        assert_eq!(Status::from(err).code(), Code::ResourceExhausted);
    }

    #[test]
    fn status_message_survives_header_encoding() {
        let mut headers = HeaderMap::new();
        write_status(&mut headers, Code::NotFound, "cluster \"prod\" not found & gone");
        let status = read_status(&headers).unwrap();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "cluster \"prod\" not found & gone");

        assert!(read_status(&HeaderMap::new()).is_none());
    }
}
