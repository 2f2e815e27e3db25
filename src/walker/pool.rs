//! Bounded pool of worker slots
//!
//! The slot table and the active-worker counter live under one lock. The
//! lock guards bookkeeping only, never I/O, so it is contended at the rate
//! directories are discovered rather than the rate files are.
//!
//! A slot is granted before its thread exists and released by that thread as
//! its very last action, so `active() == 0` means every granted worker,
//! including the root, has finished its subtree and flushed its buffer.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing::warn;

/// Handle to a granted slot
///
/// The generation distinguishes successive owners of the same table entry, so
/// a stale id can never release or annotate a slot it no longer owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId {
    index: usize,
    generation: u64,
}

impl SlotId {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Default)]
struct Slot {
    occupied: bool,
    generation: u64,
    /// Directory the owning worker was started on
    path: Option<PathBuf>,
    /// Owning thread; dropping it detaches the thread
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<Slot>,
    active: usize,
    granted: u64,
    peak: usize,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots granted over the whole walk (root included)
    pub granted: u64,

    /// Highest number of simultaneously active workers
    pub peak_active: usize,
}

/// Fixed-size worker slot table plus active-worker counter
#[derive(Debug)]
pub struct SlotPool {
    state: Mutex<PoolState>,
    capacity: usize,
}

impl SlotPool {
    /// Create a pool with `capacity` slots (at least one, for the root)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| Slot::default()).collect();

        Self {
            state: Mutex::new(PoolState {
                slots,
                active: 0,
                granted: 0,
                peak: 0,
            }),
            capacity,
        }
    }

    /// Claim a free slot, counting its future worker as active
    ///
    /// Returns `None` when the table is full; the caller walks inline.
    pub fn try_acquire_slot(&self) -> Option<SlotId> {
        let mut state = self.state.lock();

        let index = state.slots.iter().position(|slot| !slot.occupied)?;
        let slot = &mut state.slots[index];
        slot.occupied = true;
        slot.generation += 1;
        let id = SlotId {
            index,
            generation: slot.generation,
        };

        state.active += 1;
        state.granted += 1;
        state.peak = state.peak.max(state.active);

        Some(id)
    }

    /// Record the thread and directory behind a granted slot
    ///
    /// The worker may already have finished and released the slot; the handle
    /// is then simply dropped.
    pub fn attach(&self, id: SlotId, path: PathBuf, handle: JoinHandle<()>) {
        let mut state = self.state.lock();
        let slot = &mut state.slots[id.index];
        if slot.occupied && slot.generation == id.generation {
            slot.path = Some(path);
            slot.handle = Some(handle);
        }
    }

    /// Free a slot and decrement the active count
    pub fn release_slot(&self, id: SlotId) {
        let mut state = self.state.lock();
        let slot = &mut state.slots[id.index];

        if !slot.occupied || slot.generation != id.generation {
            drop(state);
            warn!(slot = id.index, "Ignoring release of a slot not owned by caller");
            return;
        }

        slot.occupied = false;
        let path = slot.path.take();
        let handle = slot.handle.take();
        state.active -= 1;
        drop(state);

        drop(path);
        drop(handle);
    }

    /// Workers currently holding a slot
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    /// Size of the slot table
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            granted: state.granted,
            peak_active: state.peak,
        }
    }

    /// Directories whose workers still hold a slot
    pub fn live_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .filter(|slot| slot.occupied)
            .filter_map(|slot| slot.path.clone())
            .collect()
    }
}
