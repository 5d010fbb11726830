//! Mutation propagation between replicas.
//!
//! This core treats the transport as an opaque reliable broadcast: a
//! committed [`MutationEnvelope`] is handed to a [`SyncTransport`], and
//! remote envelopes come back through `Replica::ingest_remote` in whatever
//! order the network produces. Convergence does not depend on delivery
//! order (creates are content-addressed and idempotent, vote slots merge
//! last-writer-wins), so the only ordering machinery needed is the
//! [`LogicalClock`] that keeps local transitions ahead of everything a
//! replica has already observed.
//!
//! [`LocalHub`] is an in-process transport connecting several replicas
//! through per-member inboxes. Tests and simulations drain the inboxes
//! explicitly, which makes delivery order and interleaving part of the test
//! instead of an accident of scheduling.

use crate::error::{AgoraError, Result};
use crate::graph::id::current_timestamp_millis;
use crate::graph::op::MutationBatch;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Identifier of one replica, unique per process/device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Generates a random replica id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wraps an explicit id, for tests and simulations.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed mutation batch tagged for propagation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationEnvelope {
    /// The replica that committed the batch.
    pub origin: ReplicaId,
    /// Per-origin sequence number, for diagnostics.
    pub seq: u64,
    pub batch: MutationBatch,
}

impl MutationEnvelope {
    pub fn new(origin: ReplicaId, seq: u64, batch: MutationBatch) -> Self {
        Self { origin, seq, batch }
    }

    /// The largest timestamp carried by the batch; feeds the receiving
    /// replica's logical clock.
    pub fn max_timestamp(&self) -> u64 {
        self.batch.max_timestamp()
    }
}

/// Lamport-style millisecond clock.
///
/// `tick` returns `max(wall_ms, last + 1)`, so timestamps issued by one
/// replica strictly increase even within one millisecond, and `observe`
/// folds in remote timestamps so later local transitions always win the
/// last-writer-wins merge against everything already seen.
#[derive(Debug)]
pub struct LogicalClock {
    last: Mutex<u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    /// Issues the next local timestamp.
    pub fn tick(&self) -> u64 {
        let mut last = self.last.lock().expect("logical clock lock poisoned");
        *last = (*last + 1).max(current_timestamp_millis());
        *last
    }

    /// Advances the clock past a remotely observed timestamp.
    pub fn observe(&self, remote_ts: u64) {
        let mut last = self.last.lock().expect("logical clock lock poisoned");
        *last = (*last).max(remote_ts);
    }

    /// The latest timestamp issued or observed.
    pub fn last(&self) -> u64 {
        *self.last.lock().expect("logical clock lock poisoned")
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Seam to the external sync layer. Implementations accept a committed
/// envelope for asynchronous reconciliation; retry and backoff live behind
/// this trait, never in the core.
pub trait SyncTransport: Send + Sync {
    /// Hands a committed envelope to the transport.
    ///
    /// # Errors
    /// Returns a sync error if the transport cannot accept the envelope.
    fn publish(&self, envelope: MutationEnvelope) -> Result<()>;
}

/// Transport for a detached replica: accepts and discards everything.
#[derive(Debug, Default)]
pub struct NullTransport;

impl SyncTransport for NullTransport {
    fn publish(&self, _envelope: MutationEnvelope) -> Result<()> {
        Ok(())
    }
}

/// In-process reliable broadcast connecting several replicas.
///
/// Every published envelope lands in the inbox of every member except its
/// origin. Members drain their inbox explicitly and feed the envelopes into
/// `Replica::ingest_remote`.
#[derive(Default)]
pub struct LocalHub {
    inboxes: Mutex<HashMap<ReplicaId, Vec<MutationEnvelope>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member and returns its transport handle.
    pub fn register(hub: &Arc<LocalHub>, id: &ReplicaId) -> Arc<HubTransport> {
        hub.inboxes
            .lock()
            .expect("local hub lock poisoned")
            .entry(id.clone())
            .or_default();
        Arc::new(HubTransport {
            hub: Arc::clone(hub),
            origin: id.clone(),
        })
    }

    fn route(&self, envelope: MutationEnvelope) -> Result<()> {
        let mut inboxes = self.inboxes.lock().expect("local hub lock poisoned");
        if !inboxes.contains_key(&envelope.origin) {
            return Err(AgoraError::sync(format!(
                "Publishing replica {} is not registered",
                envelope.origin
            )));
        }
        let mut delivered = 0usize;
        for (member, inbox) in inboxes.iter_mut() {
            if *member != envelope.origin {
                inbox.push(envelope.clone());
                delivered += 1;
            }
        }
        debug!(origin = %envelope.origin, seq = envelope.seq, delivered, "routed envelope");
        Ok(())
    }

    /// Takes every envelope queued for `id`, in arrival order.
    pub fn drain(&self, id: &ReplicaId) -> Vec<MutationEnvelope> {
        self.inboxes
            .lock()
            .expect("local hub lock poisoned")
            .get_mut(id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of envelopes queued for `id`.
    pub fn queued(&self, id: &ReplicaId) -> usize {
        self.inboxes
            .lock()
            .expect("local hub lock poisoned")
            .get(id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// One member's handle onto a [`LocalHub`].
pub struct HubTransport {
    hub: Arc<LocalHub>,
    origin: ReplicaId,
}

impl SyncTransport for HubTransport {
    fn publish(&self, envelope: MutationEnvelope) -> Result<()> {
        if envelope.origin != self.origin {
            return Err(AgoraError::sync(format!(
                "Envelope origin {} does not match transport registration {}",
                envelope.origin, self.origin
            )));
        }
        self.hub.route(envelope)
    }
}
