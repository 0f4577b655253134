//! Keyed hash functions for hash-style page tables.

use serde::{Deserialize, Serialize};

/// Hash function used to index hash and cuckoo page tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashFunction {
    /// Seeded XXH3-64.
    #[default]
    #[serde(alias = "city", alias = "xxh3")]
    Xxh3,
    /// BLAKE3 in keyed mode, truncated to 64 bits.
    #[serde(alias = "blake2", alias = "blake3")]
    Blake3,
}

impl HashFunction {
    /// Hashes `key` under `salt`; different salts give independent hashes.
    pub fn hash(&self, key: u64, salt: u64) -> u64 {
        match self {
            HashFunction::Xxh3 => xxhash_rust::xxh3::xxh3_64_with_seed(&key.to_le_bytes(), salt),
            HashFunction::Blake3 => {
                let mut k = [0u8; 32];
                k[..8].copy_from_slice(&salt.to_le_bytes());
                let digest = blake3::keyed_hash(&k, &key.to_le_bytes());
                let mut out = [0u8; 8];
                out.copy_from_slice(&digest.as_bytes()[..8]);
                u64::from_le_bytes(out)
            }
        }
    }
}
