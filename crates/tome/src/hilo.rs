//! HiLo identifier generation.
//!
//! Each collection hands out numbers from a locally cached range. When the
//! range runs out, a new one is reserved from the backend, which persists
//! the high-water mark. Ranges never overlap, so identifiers stay unique
//! across store instances sharing one database and across restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use tome_store::{Backend, Result, StoreError};
use tracing::debug;

/// Per-collection range allocator.
pub struct HiLoGenerator {
    capacity: u64,
    ranges: Mutex<HashMap<String, Range>>,
}

/// Numbers `next..=max` are still free.
#[derive(Debug, Clone, Copy)]
struct Range {
    next: u64,
    max: u64,
}

impl HiLoGenerator {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            ranges: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Next number for `collection`, reserving a new range if needed.
    pub fn next(&self, backend: &dyn Backend, collection: &str) -> Result<u64> {
        let mut ranges = self
            .ranges
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("hilo ranges: {}", e)))?;

        let range = ranges.entry(collection.to_string()).or_insert(Range { next: 1, max: 0 });
        if range.next > range.max {
            let max = backend.reserve_hilo(collection, self.capacity)?;
            *range = Range {
                next: max.saturating_sub(self.capacity) + 1,
                max,
            };
            debug!(collection, low = range.next, high = max, "reserved hilo range");
        }

        let value = range.next;
        range.next += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_store::MemoryBackend;

    #[test]
    fn test_sequential_within_range() {
        let backend = MemoryBackend::new();
        let hilo = HiLoGenerator::new(4);

        let ids: Vec<u64> = (0..6).map(|_| hilo.next(&backend, "Docs").unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_collections_are_independent() {
        let backend = MemoryBackend::new();
        let hilo = HiLoGenerator::new(32);

        assert_eq!(hilo.next(&backend, "Docs").unwrap(), 1);
        assert_eq!(hilo.next(&backend, "People").unwrap(), 1);
        assert_eq!(hilo.next(&backend, "Docs").unwrap(), 2);
    }

    #[test]
    fn test_two_generators_never_collide() {
        let backend = MemoryBackend::new();
        let a = HiLoGenerator::new(3);
        let b = HiLoGenerator::new(3);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..10 {
            assert!(seen.insert(a.next(&backend, "Docs").unwrap()));
            assert!(seen.insert(b.next(&backend, "Docs").unwrap()));
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let hilo = HiLoGenerator::new(0);
        assert_eq!(hilo.capacity(), 1);

        let backend = MemoryBackend::new();
        assert_eq!(hilo.next(&backend, "Docs").unwrap(), 1);
        assert_eq!(hilo.next(&backend, "Docs").unwrap(), 2);
    }
}
