//! `plexus-relay` — binary activation streaming between pipeline stages.
//!
//! This crate is a **framing and correlation layer**, not a transport.
//! `send` produces wire frames through a caller-supplied transmit
//! function; the transport feeds received frames back through
//! `handle_incoming`. WebRTC, TCP, or an in-process loopback all plug in
//! the same way.
//!
//! ```text
//! stage N ──serialize──▶ [frame │ chunks] ──transmit──▶ (transport)
//! (transport) ──handle_incoming──▶ waiter for (request, stage N+1)
//! ```

pub mod chunk;
pub mod codec;
pub mod error;
pub mod relay;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use chunk::{split_chunks, ChunkAssembler, CHUNK_PREFIX_BYTES};
pub use codec::{deserialize, serialize};
pub use error::{RelayError, Result};
pub use relay::ActivationRelay;
