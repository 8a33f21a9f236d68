//! The server's payload source.
//!
//! Generated once at startup and shared read-only by every session. Payloads
//! longer than the pool repeat it from the start.

use crate::protocol::Checksum;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default pool size: 1 MiB.
pub const DEFAULT_POOL_SIZE: usize = 1024 * 1024;

/// Immutable buffer of pseudo-random bytes.
///
/// Cloning is cheap and shares the same allocation.
#[derive(Clone)]
pub struct RandomPool {
    bytes: Arc<[u8]>,
}

impl RandomPool {
    /// Fill a pool of `size` bytes, from `seed` when given or OS entropy otherwise.
    pub fn generate(size: NonZeroUsize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut bytes = vec![0u8; size.get()];
        rng.fill_bytes(&mut bytes);

        Self {
            bytes: bytes.into(),
        }
    }

    /// Wrap existing bytes. Returns `None` for an empty buffer.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return None;
        }
        Some(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The contiguous slices making up a payload of `total` bytes, in order.
    pub fn chunks(&self, total: u64) -> PoolChunks<'_> {
        PoolChunks {
            pool: &self.bytes,
            remaining: total,
        }
    }

    /// Checksum of the payload a session would send for `total` bytes.
    pub fn checksum(&self, total: u64) -> Checksum {
        let mut checksum = Checksum::new();
        for chunk in self.chunks(total) {
            checksum.update(chunk);
        }
        checksum
    }
}

impl std::fmt::Debug for RandomPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPool")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Iterator over pool slices covering a payload, restarting at the pool's
/// start each time it is exhausted.
pub struct PoolChunks<'a> {
    pool: &'a [u8],
    remaining: u64,
}

impl<'a> Iterator for PoolChunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let len = self.remaining.min(self.pool.len() as u64) as usize;
        self.remaining -= len as u64;
        Some(&self.pool[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_generate_size() {
        let pool = RandomPool::generate(size(4096), None);
        assert_eq!(pool.len(), 4096);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = RandomPool::generate(size(1024), Some(7));
        let b = RandomPool::generate(size(1024), Some(7));
        let c = RandomPool::generate(size(1024), Some(8));

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(RandomPool::from_bytes(Vec::<u8>::new()).is_none());
        assert!(RandomPool::from_bytes(vec![1u8]).is_some());
    }

    #[test]
    fn test_chunks_within_pool() {
        let pool = RandomPool::from_bytes((0..100u8).collect::<Vec<_>>()).unwrap();

        let chunks: Vec<&[u8]> = pool.chunks(10).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], &pool.as_bytes()[..10]);

        assert_eq!(pool.chunks(0).count(), 0);
    }

    #[test]
    fn test_chunks_wrap() {
        let pool = RandomPool::from_bytes((0..100u8).collect::<Vec<_>>()).unwrap();

        let payload: Vec<u8> = pool.chunks(250).flatten().copied().collect();
        assert_eq!(payload.len(), 250);
        assert_eq!(&payload[..100], pool.as_bytes());
        assert_eq!(&payload[100..200], pool.as_bytes());
        assert_eq!(&payload[200..], &pool.as_bytes()[..50]);

        let lens: Vec<usize> = pool.chunks(250).map(<[u8]>::len).collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    fn test_checksum_matches_payload() {
        let pool = RandomPool::generate(size(1000), Some(1));
        let payload: Vec<u8> = pool.chunks(2500).flatten().copied().collect();

        assert_eq!(pool.checksum(2500).digest(), Checksum::of(&payload).digest());
        assert_eq!(pool.checksum(0).to_hex(), Checksum::new().to_hex());
    }
}
