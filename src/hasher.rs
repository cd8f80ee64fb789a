//! Hasher for entry names

use std::hash::{BuildHasher, Hasher};

const OFFSET_BASIS: u32 = 5381;
const PRIME: u32 = 33;

/// The engine's "FNV-1" name hash. It's really a multiply-then-xor string hash with its own
/// seed and prime, so it doesn't match any of the standard FNV variants.
pub struct Fnv1 {
    hash: u32,
}

impl Fnv1 {
    pub fn new() -> Self {
        Fnv1 { hash: OFFSET_BASIS }
    }
}

impl Default for Fnv1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv1 {
    fn finish(&self) -> u64 {
        u64::from(self.hash)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.hash = self.hash.wrapping_mul(PRIME) ^ u32::from(b);
        }
    }
}

pub struct BuildFnv1;

impl BuildHasher for BuildFnv1 {
    type Hasher = Fnv1;

    fn build_hasher(&self) -> Self::Hasher {
        Fnv1::new()
    }
}

/// Hash of an entry name's raw bytes, as stored alongside decoded entries for fast lookup
pub fn hash_name(name: &[u8]) -> u32 {
    let mut hasher = BuildFnv1.build_hasher();
    // Not `name.hash(..)`, which would also feed in a length prefix
    hasher.write(name);
    hasher.finish() as u32
}
