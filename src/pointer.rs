//! Routing handle and identity for a ring member.

use crate::id::Id;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;

/// An immutable `(address, id)` pair. Equality and hashing are by `id` alone: two
/// `Pointer`s naming the same id are the same peer as far as the protocol is concerned,
/// even if constructed from different address representations.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Pointer {
    pub addr: SocketAddr,
    pub id: Id,
}

impl Pointer {
    /// Builds a `Pointer` by hashing `addr` into the ring's id space.
    pub fn new(addr: SocketAddr) -> Self {
        Pointer {
            addr,
            id: hash_addr(addr),
        }
    }
}

/// Hashes a socket address into a ring `Id` via the first 8 bytes of its SHA-256 digest.
pub fn hash_addr(addr: SocketAddr) -> Id {
    let mut hasher = Sha256::new();
    match addr {
        SocketAddr::V4(v4) => hasher.update(v4.ip().octets()),
        SocketAddr::V6(v6) => hasher.update(v6.ip().octets()),
    }
    hasher.update(addr.port().to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Id(u64::from_be_bytes(bytes))
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pointer {}

impl std::hash::Hash for Pointer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}
