//! Anonymous device identity.
//!
//! Posting, commenting and voting attribute to a stable opaque string per
//! device. Where that string comes from (and whether it persists across
//! restarts) is the host application's concern, behind [`IdentitySource`].

use crate::graph::entity::UserId;
use rand::rngs::OsRng;
use rand::RngCore;

/// Supplies the stable identity of the current device.
pub trait IdentitySource: Send + Sync {
    /// Returns the device identity. Stable for the lifetime of the source.
    fn current_identity(&self) -> UserId;
}

/// A freshly generated random identity, stable for the lifetime of the
/// value. Persistence across restarts is up to the caller.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    id: UserId,
}

impl DeviceIdentity {
    /// Generates a new anonymous identity.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        OsRng.fill_bytes(&mut bytes);
        Self {
            id: UserId::new(format!("anon-{}", hex::encode(bytes))),
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::generate()
    }
}

impl IdentitySource for DeviceIdentity {
    fn current_identity(&self) -> UserId {
        self.id.clone()
    }
}

/// A fixed identity, for tests and for modelling one user on several
/// devices.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    id: UserId,
}

impl FixedIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
        }
    }
}

impl IdentitySource for FixedIdentity {
    fn current_identity(&self) -> UserId {
        self.id.clone()
    }
}
