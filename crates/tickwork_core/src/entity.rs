//! # Entity Management
//!
//! Entities are bare identifiers. They carry no data of their own; systems
//! key whatever state they keep by `EntityId` and drop it on removal.
//!
//! Ids come from an [`EntityAllocator`] owned by whoever builds the world,
//! so independent allocators never collide in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an entity.
///
/// Ids are issued in increasing order starting at 1 and are never reused.
/// Ordering between two ids is their allocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw id value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues globally unique, monotonically increasing entity ids.
///
/// # Thread Safety
///
/// Both allocation forms are lock-free. A batch is reserved with a single
/// atomic add, so every id in it is contiguous and no concurrent caller can
/// receive one of them.
///
/// # Example
///
/// ```rust,ignore
/// let ids = EntityAllocator::new();
/// let player = ids.new_entity();
/// let wave = ids.new_entities(32);
/// assert!(wave[0] > player);
/// ```
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Number of ids handed out so far; also the last id issued.
    issued: AtomicU64,
}

impl EntityAllocator {
    /// Creates an allocator whose first id will be 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
        }
    }

    /// Issues a single id.
    #[inline]
    pub fn new_entity(&self) -> EntityId {
        EntityId(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Issues `count` contiguous ids as one group.
    ///
    /// Use this when a burst of entities must be allocated atomically, e.g.
    /// to keep ids deterministic in tests that spawn from several threads.
    pub fn new_entities(&self, count: usize) -> Vec<EntityId> {
        if count == 0 {
            return Vec::new();
        }
        let count = count as u64;
        let first = self.issued.fetch_add(count, Ordering::Relaxed) + 1;
        (first..first + count).map(EntityId).collect()
    }

    /// Returns how many ids have been issued.
    #[inline]
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_id_is_one() {
        let ids = EntityAllocator::new();
        assert_eq!(ids.new_entity(), EntityId::from_raw(1));
        assert_eq!(ids.new_entity(), EntityId::from_raw(2));
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_batch_is_contiguous() {
        let ids = EntityAllocator::new();
        let _ = ids.new_entity();

        let batch = ids.new_entities(5);
        let raw: Vec<u64> = batch.iter().map(|id| id.raw()).collect();
        assert_eq!(raw, vec![2, 3, 4, 5, 6]);
        assert_eq!(ids.new_entity().raw(), 7);
    }

    #[test]
    fn test_empty_batch_reserves_nothing() {
        let ids = EntityAllocator::new();
        assert!(ids.new_entities(0).is_empty());
        assert_eq!(ids.issued(), 0);
    }

    #[test]
    fn test_independent_allocators() {
        let a = EntityAllocator::new();
        let b = EntityAllocator::new();
        assert_eq!(a.new_entity(), b.new_entity());
    }

    #[test]
    fn test_concurrent_batches_never_overlap() {
        let ids = Arc::new(EntityAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..100 {
                        let batch = ids.new_entities(10);
                        assert!(batch.windows(2).all(|w| w[1].raw() == w[0].raw() + 1));
                        mine.extend(batch);
                        mine.push(ids.new_entity());
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8 * 100 * 11);
        assert_eq!(ids.issued(), 8 * 100 * 11);
    }

    proptest! {
        #[test]
        fn prop_ids_distinct_and_increasing(requests in proptest::collection::vec(0usize..16, 1..64)) {
            let ids = EntityAllocator::new();
            let mut issued = Vec::new();
            for n in requests {
                if n == 0 {
                    issued.push(ids.new_entity());
                } else {
                    let batch = ids.new_entities(n);
                    prop_assert_eq!(batch.len(), n);
                    prop_assert!(batch.windows(2).all(|w| w[1].raw() == w[0].raw() + 1));
                    issued.extend(batch);
                }
            }
            prop_assert!(issued.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
