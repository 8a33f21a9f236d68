//! Streaming XXH64 checksum over a payload.

use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Incremental checksum accumulator.
///
/// Both peers feed it the payload bytes in transmission order; chunk
/// boundaries do not affect the digest.
pub struct Checksum {
    hasher: XxHash64,
    len: u64,
}

impl Checksum {
    pub fn new() -> Self {
        Self {
            hasher: XxHash64::with_seed(0),
            len: 0,
        }
    }

    /// Checksum of a complete byte sequence.
    pub fn of(data: &[u8]) -> Self {
        let mut checksum = Self::new();
        checksum.update(data);
        checksum
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.write(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn digest(&self) -> u64 {
        self.hasher.finish()
    }

    /// Lowercase hex of the big-endian digest, always 16 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.digest().to_be_bytes())
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checksum")
            .field("len", &self.len)
            .field("digest", &self.to_hex())
            .finish()
    }
}
