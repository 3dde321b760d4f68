//! Activation relay: pending-wait correlation and chunked send.
//!
//! The relay never performs network I/O. `send` hands wire frames to a
//! caller-supplied transmit function; the transport calls
//! [`ActivationRelay::handle_incoming`] with each received frame. Waiters
//! and arrivals meet in a concurrent pending-wait table keyed by
//! `(request_id, stage_index)`.

use std::sync::RwLock;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use plexus_types::config::RelayConfig;
use plexus_types::runtime::ActivationMessage;

use crate::chunk;
use crate::codec;
use crate::error::{RelayError, Result};

type WaitKey = (String, u32);
type ReceiveTap = Box<dyn Fn(&ActivationMessage) + Send + Sync>;

/// Correlates in-flight activation waits with incoming frames and splits
/// outgoing frames into transport-sized chunks.
///
/// Shared across concurrent requests; every operation is safe under
/// concurrent insert / resolve / timeout.
pub struct ActivationRelay {
    config: RelayConfig,
    pending: DashMap<WaitKey, oneshot::Sender<ActivationMessage>>,
    tap: RwLock<Option<ReceiveTap>>,
}

impl ActivationRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            pending: DashMap::new(),
            tap: RwLock::new(None),
        }
    }

    // ── Send ─────────────────────────────────────────────────────────────

    /// Serialize `msg` and hand it to `transmit`, splitting into prefixed
    /// chunks when the frame exceeds the configured threshold. Returns the
    /// number of frames transmitted.
    pub fn send<F>(&self, msg: &ActivationMessage, mut transmit: F) -> Result<u32>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let frame = codec::serialize(msg)?;

        if frame.len() <= self.config.chunk_bytes {
            transmit(&frame)?;
            return Ok(1);
        }

        let chunks = chunk::split_chunks(&frame, self.config.chunk_bytes)?;
        let count = chunks.len() as u32;
        debug!(
            request_id = %msg.request_id,
            stage_index = msg.stage_index,
            frame_bytes = frame.len(),
            chunks = count,
            "chunking activation frame"
        );
        for c in &chunks {
            transmit(c)?;
        }
        Ok(count)
    }

    // ── Receive ──────────────────────────────────────────────────────────

    /// Register a tap invoked for every decoded incoming message, before
    /// waiter resolution. Replaces any previous tap.
    pub fn on_receive<F>(&self, tap: F)
    where
        F: Fn(&ActivationMessage) + Send + Sync + 'static,
    {
        *self.tap.write().expect("tap lock poisoned") = Some(Box::new(tap));
    }

    /// Decode one complete wire frame, notify the tap, and resolve a
    /// matching waiter if one is pending. Returns the decoded message.
    ///
    /// Chunked transports reassemble with [`chunk::ChunkAssembler`] before
    /// calling this.
    pub fn handle_incoming(&self, frame: &[u8]) -> Result<ActivationMessage> {
        let msg = codec::deserialize(frame)?;

        if let Some(tap) = self.tap.read().expect("tap lock poisoned").as_ref() {
            tap(&msg);
        }

        let key = (msg.request_id.clone(), msg.stage_index);
        if let Some((_, sender)) = self.pending.remove(&key) {
            // The waiter may have timed out between removal and send.
            if sender.send(msg.clone()).is_err() {
                debug!(
                    request_id = %msg.request_id,
                    stage_index = msg.stage_index,
                    "waiter gone before delivery"
                );
            }
        }
        Ok(msg)
    }

    // ── Wait ─────────────────────────────────────────────────────────────

    /// Block until an activation for `(request_id, stage_index)` arrives,
    /// the configured timeout elapses, or the wait is cancelled.
    ///
    /// A second wait on a key that already has a pending waiter replaces
    /// the first; the replaced waiter fails with `Cancelled`. Distinct
    /// keys are fully independent.
    pub async fn wait_for_activation(
        &self,
        request_id: &str,
        stage_index: u32,
    ) -> Result<ActivationMessage> {
        let key = (request_id.to_string(), stage_index);
        let (tx, rx) = oneshot::channel();

        if self.pending.insert(key.clone(), tx).is_some() {
            warn!(request_id, stage_index, "replacing pending waiter for key");
        }

        match tokio::time::timeout(self.config.wait_timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_closed)) => Err(RelayError::Cancelled {
                request_id: request_id.to_string(),
                stage_index,
            }),
            Err(_elapsed) => {
                self.pending.remove(&key);
                Err(RelayError::Timeout {
                    request_id: request_id.to_string(),
                    stage_index,
                })
            }
        }
    }

    // ── Cancellation ─────────────────────────────────────────────────────

    /// Reject every outstanding wait. Used on relay teardown.
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            debug!(count, "cancelled all pending waits");
        }
        count
    }

    /// Reject the outstanding waits of a single request. Used when one
    /// pipeline aborts without tearing the relay down.
    pub fn cancel_request(&self, request_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| key.0 != request_id);
        before - self.pending.len()
    }

    /// Number of outstanding waits, for monitoring.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn msg(request_id: &str, stage_index: u32, elements: usize) -> ActivationMessage {
        ActivationMessage {
            request_id: request_id.into(),
            shard_id: "shard-0".into(),
            stage_index,
            tensor: vec![0.25; elements],
            shape: vec![elements as u32],
            timestamp: Utc::now(),
        }
    }

    fn short_timeout_relay() -> ActivationRelay {
        ActivationRelay::new(RelayConfig {
            wait_timeout: Duration::from_millis(50),
            ..RelayConfig::default()
        })
    }

    #[test]
    fn small_frame_sent_whole() {
        let relay = ActivationRelay::new(RelayConfig::default());
        let mut frames: Vec<Vec<u8>> = Vec::new();
        let sent = relay
            .send(&msg("req-1", 0, 16), |f| {
                frames.push(f.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(sent, 1);
        let decoded = codec::deserialize(&frames[0]).unwrap();
        assert_eq!(decoded.tensor.len(), 16);
    }

    #[test]
    fn large_frame_chunked_and_reassembled() {
        let relay = ActivationRelay::new(RelayConfig::default());
        // 32768 floats = 128 KiB payload, over the 64 KiB threshold.
        let original = msg("req-1", 1, 32_768);

        let mut frames: Vec<Vec<u8>> = Vec::new();
        let sent = relay
            .send(&original, |f| {
                frames.push(f.to_vec());
                Ok(())
            })
            .unwrap();
        assert!(sent > 1);
        assert_eq!(frames.len(), sent as usize);

        let mut asm = chunk::ChunkAssembler::new();
        let mut out = None;
        for frame in &frames {
            out = asm.push(frame).unwrap();
        }
        let decoded = relay.handle_incoming(&out.unwrap()).unwrap();
        assert_eq!(decoded.tensor.len(), 32_768);
    }

    #[test]
    fn transmit_error_propagates() {
        let relay = ActivationRelay::new(RelayConfig::default());
        let result = relay.send(&msg("req-1", 0, 4), |_| {
            Err(RelayError::Transmit("link down".into()))
        });
        assert!(matches!(result, Err(RelayError::Transmit(_))));
    }

    #[tokio::test]
    async fn wait_resolves_on_matching_arrival() {
        let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
        let waiter = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-1", 3).await })
        };
        tokio::task::yield_now().await;

        let frame = codec::serialize(&msg("req-1", 3, 8)).unwrap();
        relay.handle_incoming(&frame).unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.stage_index, 3);
        assert_eq!(relay.pending_count(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_with_distinct_error() {
        let relay = short_timeout_relay();
        let err = relay.wait_for_activation("req-1", 0).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout { .. }));
        assert_eq!(relay.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_rejects_outstanding_waits() {
        let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
        let waiter = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-1", 0).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(relay.cancel_all(), 1);
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cancel_request_is_targeted() {
        let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
        let doomed = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-a", 0).await })
        };
        let survivor = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-b", 0).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(relay.cancel_request("req-a"), 1);
        assert!(matches!(
            doomed.await.unwrap().unwrap_err(),
            RelayError::Cancelled { .. }
        ));

        let frame = codec::serialize(&msg("req-b", 0, 2)).unwrap();
        relay.handle_incoming(&frame).unwrap();
        assert!(survivor.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn concurrent_waits_on_distinct_keys_are_independent() {
        let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
        let mut waiters = Vec::new();
        for stage in 0..4u32 {
            let relay = relay.clone();
            waiters.push(tokio::spawn(async move {
                relay.wait_for_activation("req-1", stage).await
            }));
        }
        tokio::task::yield_now().await;

        // Resolve in reverse order; each waiter gets its own stage.
        for stage in (0..4u32).rev() {
            let frame = codec::serialize(&msg("req-1", stage, 1)).unwrap();
            relay.handle_incoming(&frame).unwrap();
        }
        for (stage, waiter) in waiters.into_iter().enumerate() {
            assert_eq!(waiter.await.unwrap().unwrap().stage_index, stage as u32);
        }
    }

    #[tokio::test]
    async fn second_waiter_replaces_first() {
        let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
        let first = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-1", 0).await })
        };
        tokio::task::yield_now().await;

        let second = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.wait_for_activation("req-1", 0).await })
        };
        tokio::task::yield_now().await;

        assert!(matches!(
            first.await.unwrap().unwrap_err(),
            RelayError::Cancelled { .. }
        ));

        let frame = codec::serialize(&msg("req-1", 0, 1)).unwrap();
        relay.handle_incoming(&frame).unwrap();
        assert!(second.await.unwrap().is_ok());
    }

    #[test]
    fn tap_sees_every_message() {
        let relay = ActivationRelay::new(RelayConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        relay.on_receive(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for stage in 0..3 {
            let frame = codec::serialize(&msg("req-1", stage, 1)).unwrap();
            relay.handle_incoming(&frame).unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
