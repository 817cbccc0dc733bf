//! Session Registry
//!
//! Tracks the clients that are currently connected and the handle used to
//! close each connection. Knows nothing about drawings.

mod registry;

pub use registry::{ClientInfo, ClosedSignal, SessionError, SessionRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a connected client.
///
/// Assigned by the registry from a monotonically increasing counter, so an id
/// is never handed out twice during the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}
