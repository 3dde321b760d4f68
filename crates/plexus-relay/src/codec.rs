//! Binary wire format for activation tensors.
//!
//! ```text
//! [u32 header_len LE][UTF-8 JSON header, zero-padded to 4-byte boundary][f32 LE payload]
//! ```
//!
//! `header_len` is the unpadded JSON length. The header carries the float
//! element count: padding makes the byte length alone ambiguous, and the
//! payload length is validated against the header on decode. Every integer
//! on the wire is little-endian, so frames round-trip across architectures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plexus_types::runtime::ActivationMessage;

use crate::error::{RelayError, Result};

/// JSON header preceding the raw tensor bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivationHeader {
    request_id: String,
    shard_id: String,
    stage_index: u32,
    shape: Vec<u32>,
    timestamp: DateTime<Utc>,
    /// Number of f32 elements in the payload.
    element_count: u32,
}

/// Pad `len` up to the next 4-byte boundary.
fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

// ── Serialize ─────────────────────────────────────────────────────────────────

/// Encode an [`ActivationMessage`] into a wire frame.
pub fn serialize(msg: &ActivationMessage) -> Result<Vec<u8>> {
    let element_count = u32::try_from(msg.tensor.len())
        .map_err(|_| RelayError::Codec(format!("tensor too large: {} elements", msg.tensor.len())))?;

    let header = ActivationHeader {
        request_id: msg.request_id.clone(),
        shard_id: msg.shard_id.clone(),
        stage_index: msg.stage_index,
        shape: msg.shape.clone(),
        timestamp: msg.timestamp,
        element_count,
    };
    let header_bytes = serde_json::to_vec(&header).map_err(|e| RelayError::Codec(e.to_string()))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| RelayError::Codec("header exceeds u32::MAX".into()))?;

    let padded = pad4(header_bytes.len());
    let mut buf = Vec::with_capacity(4 + padded + msg.tensor.len() * 4);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.resize(4 + padded, 0);
    for v in &msg.tensor {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    Ok(buf)
}

// ── Deserialize ───────────────────────────────────────────────────────────────

/// Decode a wire frame back into an [`ActivationMessage`].
pub fn deserialize(bytes: &[u8]) -> Result<ActivationMessage> {
    if bytes.len() < 4 {
        return Err(RelayError::Codec(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }

    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload_offset = 4 + pad4(header_len);
    if bytes.len() < payload_offset {
        return Err(RelayError::Codec(format!(
            "truncated header: need {payload_offset} bytes, have {}",
            bytes.len()
        )));
    }

    let header: ActivationHeader = serde_json::from_slice(&bytes[4..4 + header_len])
        .map_err(|e| RelayError::Codec(format!("header parse: {e}")))?;

    let payload = &bytes[payload_offset..];
    let expected = header.element_count as usize * 4;
    if payload.len() != expected {
        return Err(RelayError::Codec(format!(
            "payload length mismatch: header says {expected} bytes, frame has {}",
            payload.len()
        )));
    }

    let mut tensor = Vec::with_capacity(header.element_count as usize);
    for chunk in payload.chunks_exact(4) {
        tensor.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(ActivationMessage {
        request_id: header.request_id,
        shard_id: header.shard_id,
        stage_index: header.stage_index,
        tensor,
        shape: header.shape,
        timestamp: header.timestamp,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
