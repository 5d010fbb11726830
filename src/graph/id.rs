//! Content-derived identifiers for graph entities.
//!
//! Every entity in the graph is keyed by an [`EntityId`], a 32-byte
//! SHA3-256 digest rendered as hex. Posts and comments are content-addressed:
//! the id is computed over the bincode-serialized creation content, so the
//! same creation produces the same id on every replica. Votes use a *derived*
//! id over `(voter, target)`, which gives the vote cast by one user on one
//! target a replica-independent identity and makes the
//! one-vote-per-user-per-target invariant structural.

use crate::error::{AgoraError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Size of an entity identifier in bytes.
pub const ENTITY_ID_SIZE: usize = 32;

/// A 32-byte SHA3-256 identifier for a graph entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; ENTITY_ID_SIZE]);

impl EntityId {
    /// Computes the content-derived id of serializable creation content.
    ///
    /// Uses bincode for deterministic serialization, then SHA3-256.
    pub fn compute<T: Serialize>(content: &T) -> Result<Self> {
        let serialized = bincode::serialize(content).map_err(|e| {
            AgoraError::serialization(format!("Failed to serialize for id: {}", e))
        })?;
        let digest = Sha3_256::digest(&serialized);
        let mut bytes = [0u8; ENTITY_ID_SIZE];
        bytes.copy_from_slice(digest.as_slice());
        Ok(Self(bytes))
    }

    /// Derives an id from a domain tag and a sequence of byte parts.
    ///
    /// Parts are length-prefixed before hashing so distinct part sequences
    /// can never collide by concatenation.
    pub fn derive(tag: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(tag.as_bytes());
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; ENTITY_ID_SIZE];
        bytes.copy_from_slice(digest.as_slice());
        Self(bytes)
    }

    /// Creates an EntityId from raw bytes.
    pub fn from_bytes(bytes: [u8; ENTITY_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw id bytes.
    pub fn as_bytes(&self) -> &[u8; ENTITY_ID_SIZE] {
        &self.0
    }

    /// Returns the hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an EntityId from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|_| AgoraError::validation("Invalid hex string for EntityId"))?;
        if bytes.len() != ENTITY_ID_SIZE {
            return Err(AgoraError::validation(
                "EntityId must be exactly 32 bytes (64 hex characters)",
            ));
        }
        let mut arr = [0u8; ENTITY_ID_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Returns a short form of the id for display (first 8 bytes / 16 hex chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}...)", self.short())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Returns the current Unix timestamp in milliseconds.
pub fn current_timestamp_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
