//! Length-prefixed CBOR framing.
//!
//! Wire layout: `[length: u32 BE] + [CBOR body]`. The prefix counts body
//! bytes only. [`MAX_EVENT_SIZE`] bounds the body so a misbehaving client
//! cannot make the broker buffer unbounded input; an oversized claim is
//! rejected before any body bytes are read.

use bytes::BufMut;
use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Maximum CBOR body size in bytes (1 MiB).
pub const MAX_EVENT_SIZE: usize = 1 << 20;

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Encode an event as a length-prefixed CBOR frame.
pub fn encode<T: Serialize>(event: &T) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(event, &mut body).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if body.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::Oversized { size: body.len(), max: MAX_EVENT_SIZE });
    }

    let mut out = Vec::with_capacity(PREFIX_LEN + body.len());
    out.put_u32(body.len() as u32);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse and bound-check a length prefix.
pub fn frame_len(prefix: [u8; PREFIX_LEN]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_EVENT_SIZE {
        return Err(ProtocolError::Oversized { size: len, max: MAX_EVENT_SIZE });
    }
    Ok(len)
}

/// Decode a CBOR body (without the length prefix).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::Oversized { size: body.len(), max: MAX_EVENT_SIZE });
    }

    ciborium::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}
