// Primitives - Empreintes et montants
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Empreinte universelle (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hash(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Digest of `data` following `self` in a running chain of digests
    pub fn chain(&self, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.0);
        hasher.update(data);
        Hash(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Coins held by contracts, unbounded
pub type Balance = BigInt;

/// Gas units
pub type Gas = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Hash::hash(b"kratos"), Hash::hash(b"kratos"));
        assert_ne!(Hash::hash(b"kratos"), Hash::hash(b"kratoz"));
        assert_eq!(Hash::ZERO.to_string(), "0000000000000000");
    }

    #[test]
    fn test_chain_depends_on_order() {
        let ab = Hash::ZERO.chain(b"a").chain(b"b");
        let ba = Hash::ZERO.chain(b"b").chain(b"a");
        assert_ne!(ab, ba);
        assert_eq!(ab, Hash::ZERO.chain(b"a").chain(b"b"));
    }
}
