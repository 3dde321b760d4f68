//! Chunked framing for large activation frames.
//!
//! Frames above the configured threshold are split into ordered chunks,
//! each prefixed with:
//!
//! ```text
//! [chunk_index u32 LE][total_chunks u32 LE][chunk_byte_len u32 LE]
//! ```
//!
//! Chunks carry no message id: the transport is expected to deliver one
//! message's chunks contiguously and in order on a given link, so the
//! receive side runs one [`ChunkAssembler`] per link. Exactly-once
//! delivery remains the transport's responsibility.

use crate::error::{RelayError, Result};

/// Chunk prefix size: three u32 fields.
pub const CHUNK_PREFIX_BYTES: usize = 12;

// ── Split ─────────────────────────────────────────────────────────────────────

/// Split `frame` into prefixed chunks of at most `chunk_bytes` payload each.
///
/// The input is assumed to exceed the chunk threshold; a single-chunk
/// result is still valid output.
pub fn split_chunks(frame: &[u8], chunk_bytes: usize) -> Result<Vec<Vec<u8>>> {
    if chunk_bytes == 0 {
        return Err(RelayError::Chunking("chunk size must be non-zero".into()));
    }
    let total = frame.len().div_ceil(chunk_bytes).max(1);
    let total_u32 = u32::try_from(total)
        .map_err(|_| RelayError::Chunking(format!("too many chunks: {total}")))?;

    let mut chunks = Vec::with_capacity(total);
    for (index, payload) in frame.chunks(chunk_bytes).enumerate() {
        let mut chunk = Vec::with_capacity(CHUNK_PREFIX_BYTES + payload.len());
        chunk.extend_from_slice(&(index as u32).to_le_bytes());
        chunk.extend_from_slice(&total_u32.to_le_bytes());
        chunk.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        chunk.extend_from_slice(payload);
        chunks.push(chunk);
    }
    if chunks.is_empty() {
        // Zero-length frame still travels as one empty chunk.
        let mut chunk = Vec::with_capacity(CHUNK_PREFIX_BYTES);
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&1u32.to_le_bytes());
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunks.push(chunk);
    }
    Ok(chunks)
}

// ── Reassemble ────────────────────────────────────────────────────────────────

/// Receive-side accumulator for one message's chunks.
///
/// Chunks may arrive in any order within a message; the assembler is done
/// when every index has arrived. Feed the next message only after the
/// previous one completed.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one prefixed chunk. Returns the reassembled frame once all
    /// chunks of the current message have arrived, `None` otherwise.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        if chunk.len() < CHUNK_PREFIX_BYTES {
            return Err(RelayError::Chunking(format!(
                "chunk too short: {} bytes",
                chunk.len()
            )));
        }
        let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
        let total = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as usize;
        let byte_len = u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]) as usize;

        if total == 0 {
            return Err(RelayError::Chunking("total_chunks is zero".into()));
        }
        let payload = &chunk[CHUNK_PREFIX_BYTES..];
        if payload.len() != byte_len {
            return Err(RelayError::Chunking(format!(
                "chunk length mismatch: prefix says {byte_len}, got {}",
                payload.len()
            )));
        }

        if self.parts.is_empty() {
            self.parts = vec![None; total];
        } else if self.parts.len() != total {
            return Err(RelayError::Chunking(format!(
                "total_chunks changed mid-message: {} then {total}",
                self.parts.len()
            )));
        }
        if index >= total {
            return Err(RelayError::Chunking(format!(
                "chunk index {index} out of range (total {total})"
            )));
        }
        if self.parts[index].is_some() {
            return Err(RelayError::Chunking(format!("duplicate chunk {index}")));
        }

        self.parts[index] = Some(payload.to_vec());
        self.received += 1;

        if self.received < self.parts.len() {
            return Ok(None);
        }

        let mut frame = Vec::new();
        for part in self.parts.drain(..) {
            // All slots are filled once received == total.
            frame.extend_from_slice(&part.unwrap_or_default());
        }
        self.received = 0;
        Ok(Some(frame))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_reassemble_in_order() {
        let frame: Vec<u8> = (0..200_000u32).map(|v| v as u8).collect();
        let chunks = split_chunks(&frame, 64 * 1024).unwrap();
        assert_eq!(chunks.len(), 4);

        let mut asm = ChunkAssembler::new();
        let mut out = None;
        for chunk in &chunks {
            out = asm.push(chunk).unwrap();
        }
        assert_eq!(out.unwrap(), frame);
    }

    #[test]
    fn reassembles_out_of_order_within_a_message() {
        let frame: Vec<u8> = (0..10_000u32).map(|v| (v % 251) as u8).collect();
        let chunks = split_chunks(&frame, 4096).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut asm = ChunkAssembler::new();
        assert!(asm.push(&chunks[2]).unwrap().is_none());
        assert!(asm.push(&chunks[0]).unwrap().is_none());
        let out = asm.push(&chunks[1]).unwrap().unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn prefix_layout_is_little_endian() {
        let chunks = split_chunks(&[0xAB; 10], 4).unwrap();
        let c = &chunks[1];
        assert_eq!(u32::from_le_bytes([c[0], c[1], c[2], c[3]]), 1); // index
        assert_eq!(u32::from_le_bytes([c[4], c[5], c[6], c[7]]), 3); // total
        assert_eq!(u32::from_le_bytes([c[8], c[9], c[10], c[11]]), 4); // len
    }

    #[test]
    fn duplicate_chunk_rejected() {
        let chunks = split_chunks(&[1u8; 100], 50).unwrap();
        let mut asm = ChunkAssembler::new();
        asm.push(&chunks[0]).unwrap();
        assert!(asm.push(&chunks[0]).is_err());
    }

    #[test]
    fn inconsistent_total_rejected() {
        let a = split_chunks(&[1u8; 100], 50).unwrap();
        let b = split_chunks(&[1u8; 100], 25).unwrap();
        let mut asm = ChunkAssembler::new();
        asm.push(&a[0]).unwrap();
        assert!(asm.push(&b[1]).is_err());
    }

    #[test]
    fn assembler_reusable_after_completion() {
        let frame = vec![7u8; 80];
        let chunks = split_chunks(&frame, 40).unwrap();
        let mut asm = ChunkAssembler::new();
        for round in 0..2 {
            let mut out = None;
            for chunk in &chunks {
                out = asm.push(chunk).unwrap();
            }
            assert_eq!(out.unwrap(), frame, "round {round}");
        }
    }
}
