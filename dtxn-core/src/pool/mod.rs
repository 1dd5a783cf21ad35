//! Object Pool
//!
//! Dependency states are created once and recycled for every transaction
//! that follows, so the hot path never allocates a state.
//!
//! # Design
//!
//! The pool is a slab: slots live in a `Vec` and are addressed by a
//! [`PoolHandle`] holding the slot index and a generation counter. Releasing
//! a slot finishes the object, bumps the generation and pushes the index on a
//! free list. A handle kept past its release no longer matches the slot's
//! generation and is rejected, which turns use-after-finish into an error
//! instead of silently touching somebody else's transaction. Generations are
//! 64-bit; a slot whose generation would wrap is retired instead of reused.
//!
//! The pool does no locking; it belongs to one execution context.

use tracing::{trace, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Lifecycle contract for objects that can be recycled by an [`ObjectPool`].
///
/// Binding an object to its owner (`init`) is type-specific and therefore
/// not part of the trait.
pub trait Poolable {
    /// Create an uninitialized instance.
    fn create() -> Self;

    /// Whether the instance is currently bound to an owner.
    fn is_initialized(&self) -> bool;

    /// Reset the instance so it is indistinguishable from a fresh one.
    fn finish(&mut self);
}

/// Handle to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u64,
}

impl PoolHandle {
    /// Slot index.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    in_use: bool,
    value: T,
}

/// Cumulative pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects ever created.
    pub created: u64,
    /// Successful acquisitions.
    pub acquired: u64,
    /// Releases back into the pool.
    pub released: u64,
    /// Slots currently handed out.
    pub in_use: usize,
    /// Slots waiting on the free list.
    pub idle: usize,
}

/// Slab of recyclable objects.
#[derive(Debug)]
pub struct ObjectPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    retired: usize,
    max_slots: Option<usize>,
    stats: PoolStats,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create an empty, unbounded pool.
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    /// Create a pool and preallocate the configured number of slots.
    pub fn with_config(config: &PoolConfig) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(config.preallocate),
            free: Vec::with_capacity(config.preallocate),
            retired: 0,
            max_slots: config.max_slots,
            stats: PoolStats::default(),
        };
        let preallocate = match config.max_slots {
            Some(max) => config.preallocate.min(max),
            None => config.preallocate,
        };
        // Push in reverse so the lowest index is handed out first
        for _ in 0..preallocate {
            pool.push_slot();
        }
        pool.free.reverse();
        pool
    }

    fn push_slot(&mut self) -> u32 {
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            in_use: false,
            value: T::create(),
        });
        self.free.push(index);
        self.stats.created += 1;
        index
    }

    /// Take an uninitialized object out of the pool.
    pub fn acquire(&mut self) -> Result<PoolHandle> {
        if self.free.is_empty() {
            if let Some(max) = self.max_slots {
                if self.slots.len() - self.retired >= max {
                    return Err(Error::PoolExhausted { capacity: max });
                }
            }
            self.push_slot();
        }
        let Some(index) = self.free.pop() else {
            return Err(Error::PoolExhausted {
                capacity: self.slots.len(),
            });
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.value.is_initialized(), "pooled object was not finished");
        slot.in_use = true;
        self.stats.acquired += 1;
        trace!(index, generation = slot.generation, "acquired pool slot");

        Ok(PoolHandle {
            index,
            generation: slot.generation,
        })
    }

    fn slot(&self, handle: PoolHandle) -> Result<&Slot<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.in_use && slot.generation == handle.generation)
            .ok_or(Error::StaleHandle(handle))
    }

    fn slot_mut(&mut self, handle: PoolHandle) -> Result<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.in_use && slot.generation == handle.generation)
            .ok_or(Error::StaleHandle(handle))
    }

    /// Borrow the object behind a live handle.
    pub fn get(&self, handle: PoolHandle) -> Result<&T> {
        self.slot(handle).map(|slot| &slot.value)
    }

    /// Mutably borrow the object behind a live handle.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Result<&mut T> {
        self.slot_mut(handle).map(|slot| &mut slot.value)
    }

    /// Finish the object and return its slot to the free list.
    ///
    /// The handle, and every copy of it, is stale afterwards.
    pub fn release(&mut self, handle: PoolHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        slot.value.finish();
        slot.in_use = false;
        // Generations are never reused
        let next = slot.generation.checked_add(1);
        if let Some(generation) = next {
            slot.generation = generation;
        }
        self.stats.released += 1;
        match next {
            Some(_) => {
                self.free.push(handle.index);
                trace!(index = handle.index, "released pool slot");
            }
            None => {
                self.retired += 1;
                warn!(index = handle.index, "retiring pool slot with exhausted generation");
            }
        }
        Ok(())
    }

    /// Whether the handle still refers to a live object.
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.slot(handle).is_ok()
    }

    /// Total number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.slots.len() - self.free.len() - self.retired,
            idle: self.free.len(),
            ..self.stats
        }
    }
}

impl<T: Poolable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        owner: Option<u64>,
        hits: Vec<u64>,
    }

    impl Poolable for Counter {
        fn create() -> Self {
            Self::default()
        }

        fn is_initialized(&self) -> bool {
            self.owner.is_some()
        }

        fn finish(&mut self) {
            self.owner = None;
            self.hits.clear();
        }
    }

    #[test]
    fn acquire_and_release_recycles_slot() {
        let mut pool: ObjectPool<Counter> = ObjectPool::new();

        let first = pool.acquire().unwrap();
        pool.get_mut(first).unwrap().owner = Some(1);
        pool.get_mut(first).unwrap().hits.push(5);
        pool.release(first).unwrap();

        let second = pool.acquire().unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());

        let counter = pool.get(second).unwrap();
        assert!(!counter.is_initialized());
        assert!(counter.hits.is_empty());
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn released_handle_is_stale() {
        let mut pool: ObjectPool<Counter> = ObjectPool::new();
        let handle = pool.acquire().unwrap();
        pool.release(handle).unwrap();

        assert!(!pool.contains(handle));
        assert!(matches!(pool.get(handle), Err(Error::StaleHandle(_))));
        let err = pool.release(handle).unwrap_err();
        assert!(err.is_lifecycle());

        // A recycled slot does not revive the old handle
        let _fresh = pool.acquire().unwrap();
        assert!(pool.get(handle).is_err());
    }

    #[test]
    fn preallocated_slots_are_used_first() {
        let config = PoolConfig {
            preallocate: 4,
            max_slots: None,
        };
        let mut pool: ObjectPool<Counter> = ObjectPool::with_config(&config);
        assert_eq!(pool.stats().idle, 4);

        let handles: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(handles.iter().map(|h| h.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(pool.stats().created, 4);

        pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 5);
    }

    #[test]
    fn max_slots_is_enforced() {
        let config = PoolConfig {
            preallocate: 0,
            max_slots: Some(2),
        };
        let mut pool: ObjectPool<Counter> = ObjectPool::with_config(&config);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        assert!(matches!(pool.acquire(), Err(Error::PoolExhausted { capacity: 2 })));

        pool.release(a).unwrap();
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn stats_track_lifecycle() {
        let mut pool: ObjectPool<Counter> = ObjectPool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.idle, 1);

        pool.release(b).unwrap();
        assert_eq!(pool.stats().in_use, 0);
    }

    #[test]
    fn exhausted_generation_retires_slot() {
        let mut pool: ObjectPool<Counter> = ObjectPool::new();
        let old = pool.acquire().unwrap();
        pool.slots[old.index()].generation = u64::MAX;
        let last = PoolHandle {
            index: old.index,
            generation: u64::MAX,
        };
        pool.release(last).unwrap();

        assert!(!pool.contains(last));
        assert!(matches!(pool.get(last), Err(Error::StaleHandle(_))));

        let next = pool.acquire().unwrap();
        assert_ne!(next.index(), last.index());
        let stats = pool.stats();
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.released, 1);
    }
}
