//! Small-integer ID allocator
//!
//! Hands out the lowest free id, growing the bitmap one block at a time.
//! Two instances run in the agent: local VLAN ids and tunnel ofports.
//! Nothing here is persisted; callers re-seed from history at startup.

use cni_overlay_common::{OverlayError, OverlayResult};
use parking_lot::Mutex;
use tracing::debug;

/// Number of ids added each time the allocator grows
pub const BLOCK_SIZE: usize = 100;

/// Growable bitmap allocator guarded by a single mutex
#[derive(Debug)]
pub struct IdAllocator {
    name: &'static str,
    limit: Option<u32>,
    used: Mutex<Vec<bool>>,
}

impl IdAllocator {
    /// Unbounded allocator
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            limit: None,
            used: Mutex::new(Vec::new()),
        }
    }

    /// Allocator that never hands out ids `>= limit`
    pub fn with_limit(name: &'static str, limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(name)
        }
    }

    /// Allocate the lowest free id
    pub fn alloc(&self) -> OverlayResult<u32> {
        let mut used = self.used.lock();
        let cap = self.limit.map_or(usize::MAX, |l| l as usize);

        if let Some(id) = used.iter().take(cap).position(|u| !u) {
            used[id] = true;
            return Ok(id as u32);
        }

        let id = used.len();
        if id >= cap {
            return Err(OverlayError::IdExhausted {
                space: self.name.to_string(),
                limit: cap as u32,
            });
        }

        used.resize(id + BLOCK_SIZE, false);
        used[id] = true;
        debug!(allocator = self.name, size = used.len(), "Grew id space");
        Ok(id as u32)
    }

    /// Release `id`; ids outside the current range are ignored
    pub fn free(&self, id: u32) {
        let mut used = self.used.lock();
        if let Some(slot) = used.get_mut(id as usize) {
            *slot = false;
        }
    }

    /// Mark historical ids as in use, growing to cover the largest one
    pub fn init_by_history(&self, ids: &[u32]) {
        let Some(&max) = ids.iter().max() else {
            return;
        };

        let mut used = self.used.lock();
        let blocks = max as usize / BLOCK_SIZE + 1;
        if used.len() < blocks * BLOCK_SIZE {
            used.resize(blocks * BLOCK_SIZE, false);
        }
        for &id in ids {
            used[id as usize] = true;
        }
        debug!(allocator = self.name, count = ids.len(), max, "Seeded ids from history");
    }

    pub fn is_allocated(&self, id: u32) -> bool {
        self.used.lock().get(id as usize).copied().unwrap_or(false)
    }

    /// All ids currently in use, ascending
    pub fn allocated(&self) -> Vec<u32> {
        self.used
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, u)| **u)
            .map(|(id, _)| id as u32)
            .collect()
    }

    /// Current bitmap size
    pub fn capacity(&self) -> usize {
        self.used.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_round_trip() {
        let ids = IdAllocator::new("test");
        let id = ids.alloc().unwrap();
        ids.free(id);
        assert_eq!(ids.alloc().unwrap(), id);
    }

    #[test]
    fn test_lowest_free_first() {
        let ids = IdAllocator::new("test");
        assert_eq!(ids.alloc().unwrap(), 0);
        assert_eq!(ids.alloc().unwrap(), 1);
        assert_eq!(ids.alloc().unwrap(), 2);
        ids.free(1);
        assert_eq!(ids.alloc().unwrap(), 1);
        assert_eq!(ids.alloc().unwrap(), 3);
    }

    #[test]
    fn test_grows_by_block() {
        let ids = IdAllocator::new("test");
        for expected in 0..BLOCK_SIZE as u32 {
            assert_eq!(ids.alloc().unwrap(), expected);
        }
        assert_eq!(ids.capacity(), BLOCK_SIZE);

        assert_eq!(ids.alloc().unwrap(), BLOCK_SIZE as u32);
        assert_eq!(ids.capacity(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn test_history_replay() {
        let ids = IdAllocator::new("test");
        ids.init_by_history(&[5, 250]);

        assert!(ids.is_allocated(5));
        assert!(ids.is_allocated(250));
        assert_eq!(ids.capacity(), 300);

        for _ in 0..298 {
            let id = ids.alloc().unwrap();
            assert_ne!(id, 5);
            assert_ne!(id, 250);
        }
        assert_eq!(ids.alloc().unwrap(), 300);
    }

    #[test]
    fn test_history_empty_is_noop() {
        let ids = IdAllocator::new("test");
        ids.init_by_history(&[]);
        assert_eq!(ids.capacity(), 0);
        assert_eq!(ids.alloc().unwrap(), 0);
    }

    #[test]
    fn test_free_out_of_range_is_noop() {
        let ids = IdAllocator::new("test");
        ids.free(12345);
        assert_eq!(ids.capacity(), 0);
        assert_eq!(ids.alloc().unwrap(), 0);
    }

    #[test]
    fn test_limit_exhausted() {
        let ids = IdAllocator::with_limit("vlan", 3);
        ids.init_by_history(&[0]);
        assert_eq!(ids.alloc().unwrap(), 1);
        assert_eq!(ids.alloc().unwrap(), 2);
        match ids.alloc() {
            Err(OverlayError::IdExhausted { space, limit }) => {
                assert_eq!(space, "vlan");
                assert_eq!(limit, 3);
            }
            other => panic!("Expected IdExhausted, got {:?}", other),
        }

        ids.free(2);
        assert_eq!(ids.alloc().unwrap(), 2);
    }

    #[test]
    fn test_allocated_listing() {
        let ids = IdAllocator::new("test");
        ids.init_by_history(&[0, 1]);
        let id = ids.alloc().unwrap();
        assert_eq!(id, 2);
        assert_eq!(ids.allocated(), vec![0, 1, 2]);
    }
}
