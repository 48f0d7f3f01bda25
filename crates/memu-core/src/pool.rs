//! Per-instance image buffers.
//!
//! Each VM slot owns one byte buffer sized for the largest bitmap its
//! configured resolution can produce. Captures encode straight into that
//! buffer, so the steady-state path never allocates. Slots are locked
//! independently: two captures on the same instance serialize, captures on
//! different instances never touch shared state.

use std::{
    ops::{Deref, DerefMut},
    sync::{Mutex, MutexGuard, TryLockError},
};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Stopped,
    Started,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    buffer: Vec<u8>,
}

pub struct BufferPool {
    slots: Box<[Mutex<Slot>]>,
    default_capacity: usize,
}

impl BufferPool {
    /// Creates `capacity` empty slots. `default_capacity` is used when a slot
    /// is acquired without having been prepared.
    pub fn new(capacity: usize, default_capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| {
                Mutex::new(Slot {
                    state: SlotState::Stopped,
                    buffer: Vec::new(),
                })
            })
            .collect();
        Self {
            slots,
            default_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Sizes `handle`'s buffer to at least `bytes` and marks it started.
    /// An existing allocation is reused when it is already large enough.
    pub fn prepare(&self, handle: usize, bytes: usize) {
        let mut slot = self.lock(handle);
        if slot.buffer.len() < bytes {
            slot.buffer.resize(bytes, 0);
        }
        slot.state = SlotState::Started;
        debug!(handle, bytes = slot.buffer.len(), "slot prepared");
    }

    /// Locks `handle`'s buffer for writing, sizing it first if it was never
    /// prepared. Blocks while another guard for the same handle is alive.
    pub fn acquire(&self, handle: usize) -> SlotGuard<'_> {
        let mut slot = self.lock(handle);
        if slot.state == SlotState::Stopped && slot.buffer.len() < self.default_capacity {
            slot.buffer.resize(self.default_capacity, 0);
            slot.state = SlotState::Started;
            debug!(handle, bytes = self.default_capacity, "slot lazily prepared");
        }
        SlotGuard { slot }
    }

    /// Marks `handle` stopped and drops its logical contents. The allocation
    /// is kept so a restart does not reallocate.
    pub fn release(&self, handle: usize) {
        let mut slot = self.lock(handle);
        slot.buffer.clear();
        slot.state = SlotState::Stopped;
        debug!(handle, retained = slot.buffer.capacity(), "slot released");
    }

    /// Blocks while a guard or view for `handle` is alive.
    pub fn state(&self, handle: usize) -> SlotState {
        self.lock(handle).state
    }

    /// Checks that nothing currently holds `handle`'s buffer.
    ///
    /// # Panics
    ///
    /// If a [`SlotGuard`] or [`SlotView`] for `handle` is still alive, since
    /// starting or stopping the instance would otherwise wait on it forever.
    pub fn assert_idle(&self, handle: usize) {
        if let Err(TryLockError::WouldBlock) = self.slot(handle).try_lock() {
            panic!("capture view for instance {handle} still alive");
        }
    }

    fn slot(&self, handle: usize) -> &Mutex<Slot> {
        let Some(slot) = self.slots.get(handle) else {
            panic!(
                "instance handle {handle} out of range (pool holds {} slots)",
                self.slots.len()
            );
        };
        slot
    }

    fn lock(&self, handle: usize) -> MutexGuard<'_, Slot> {
        // A panic mid-capture leaves nothing but stale pixel bytes behind.
        self.slot(handle)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive access to one slot's buffer.
pub struct SlotGuard<'a> {
    slot: MutexGuard<'a, Slot>,
}

impl Deref for SlotGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.slot.buffer
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.slot.buffer
    }
}

/// Read-only view of the bytes written into a slot by one capture.
///
/// The view keeps the slot locked, so the next capture on the same instance
/// waits until it is dropped.
pub struct SlotView<'a> {
    guard: SlotGuard<'a>,
    len: usize,
}

impl<'a> SlotView<'a> {
    /// Narrows `guard` to its first `len` bytes.
    ///
    /// # Panics
    ///
    /// If `len` exceeds the slot's buffer.
    pub fn new(guard: SlotGuard<'a>, len: usize) -> Self {
        assert!(
            len <= guard.len(),
            "view of {len} bytes exceeds slot of {} bytes",
            guard.len()
        );
        Self { guard, len }
    }
}

impl Deref for SlotView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[..self.len]
    }
}

impl AsRef<[u8]> for SlotView<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for SlotView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotView").field("len", &self.len).finish()
    }
}
