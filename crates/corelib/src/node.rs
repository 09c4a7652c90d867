//! Node identity.
//!
//! A [`NodeInfo`] names one process participating in a ring: its
//! identifier plus the address its RPC listener is reachable at. Keep
//! this struct small and cheap to clone; it travels in every routing
//! response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::KeyId;

/// Identity of a ring member: `(id, ip, port)`.
///
/// Equality and hashing are by `id` alone; two entries with the same
/// identifier refer to the same ring position regardless of how the
/// address was spelled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: KeyId,
    pub ip: String,
    pub port: u16,
}

impl NodeInfo {
    pub fn new(id: KeyId, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            ip: ip.into(),
            port,
        }
    }

    /// The sentinel returned by the bootstrap coordinator to the very
    /// first joiner: "the ring is empty, you are it".
    pub fn sentinel() -> Self {
        Self::new(0, "", 0)
    }

    /// Whether this is the empty-ring sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.ip.is_empty()
    }

    /// `ip:port` form suitable for a socket connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeInfo {}

impl std::hash::Hash for NodeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id() {
        let a = NodeInfo::new(7, "10.0.0.1", 9000);
        let b = NodeInfo::new(7, "10.0.0.2", 9001);
        let c = NodeInfo::new(8, "10.0.0.1", 9000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sentinel_roundtrip() {
        assert!(NodeInfo::sentinel().is_sentinel());
        assert!(!NodeInfo::new(0, "127.0.0.1", 1).is_sentinel());
    }
}
