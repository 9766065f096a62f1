//! A single policied log buffer: payload, cursor, locking discipline, and
//! liveness accounting.
//!
//! Buffers are owned by registry slots behind `Arc`, so a slot swap or
//! clear can never free an object another thread is still writing into.
//! The `live_writers` counter additionally preserves the observable
//! contract that teardown and growth wait out in-flight appends.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::console::{self, ConsoleTarget};
use crate::error::LogError;
use crate::flags::{BufferFlags, LockingMode};

/// Append strategy, selected once from the buffer kind at registration.
pub(crate) enum PushPolicy {
    /// Fixed capacity; overwrites the oldest data once full.
    Ring,
    /// Never wraps; overflow either grows the buffer or rejects the write.
    NoWrap,
    /// Accepts and discards all input.
    Discard,
    /// Re-encodes input as printable lines on an external console.
    Console(Arc<dyn ConsoleTarget>),
}

/// Outcome of a push against one buffer object.
pub(crate) enum PushOutcome {
    Done,
    /// NoWrap overflow on an expandable buffer: the registry must install
    /// a doubled replacement and the append retry against it.
    NeedsGrowth,
}

pub(crate) struct LogBuffer {
    id: u64,
    tag: u32,
    flags: BufferFlags,
    policy: PushPolicy,
    capacity: usize,
    cursor: AtomicUsize,
    overflow_count: AtomicU64,
    disabled: AtomicBool,
    live_writers: AtomicU32,
    /// Held for cursor math (StateOnly) or math plus copy (Full).
    state_lock: Mutex<()>,
    payload: UnsafeCell<Box<[u8]>>,
}

// SAFETY: payload bytes are only touched through the raw-pointer copy
// helpers below, under the locking discipline selected at registration.
// `LockingMode::None` and `StateOnly` permit writer copies to interleave;
// that trade-off is the caller's, made once via `BufferFlags`.
unsafe impl Send for LogBuffer {}
unsafe impl Sync for LogBuffer {}

impl LogBuffer {
    pub(crate) fn new(
        id: u64,
        tag: u32,
        flags: BufferFlags,
        policy: PushPolicy,
        payload: Box<[u8]>,
    ) -> Self {
        Self {
            id,
            tag,
            flags,
            policy,
            capacity: payload.len(),
            cursor: AtomicUsize::new(0),
            overflow_count: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
            live_writers: AtomicU32::new(0),
            state_lock: Mutex::new(()),
            payload: UnsafeCell::new(payload),
        }
    }

    /// Build the doubled replacement for a growth, carrying over the
    /// header state and payload verbatim. Growth only exists for
    /// expandable NoWrap buffers, so the state lock excludes every
    /// in-flight copy while the old payload is cloned.
    pub(crate) fn successor(&self, id: u64, mut payload: Box<[u8]>) -> Self {
        let _guard = self.state_lock.lock();
        // SAFETY: the state lock is held, so no Full-mode copy is in
        // flight while the old payload is read.
        unsafe {
            let src = &*self.payload.get();
            payload[..self.capacity].copy_from_slice(&src[..]);
        }
        Self {
            id,
            tag: self.tag,
            flags: self.flags,
            policy: PushPolicy::NoWrap,
            capacity: payload.len(),
            cursor: AtomicUsize::new(self.cursor.load(Ordering::Acquire)),
            overflow_count: AtomicU64::new(self.overflow_count.load(Ordering::Acquire)),
            disabled: AtomicBool::new(self.disabled.load(Ordering::Acquire)),
            live_writers: AtomicU32::new(0),
            state_lock: Mutex::new(()),
            payload: UnsafeCell::new(payload),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn tag(&self) -> u32 {
        self.tag
    }

    pub(crate) fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub(crate) fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    pub(crate) fn live_writers(&self) -> u32 {
        self.live_writers.load(Ordering::Acquire)
    }

    /// Claim a writer slot. Refused once the buffer is disabled, so after
    /// `set_disabled(true)` the writer count can only drain (any racing
    /// increment is immediately undone here).
    pub(crate) fn begin_write(&self) -> bool {
        self.live_writers.fetch_add(1, Ordering::AcqRel);
        if self.disabled.load(Ordering::Acquire) {
            self.live_writers.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    pub(crate) fn end_write(&self) {
        self.live_writers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Append under this buffer's policy. Invoked only between
    /// `begin_write`/`end_write`.
    pub(crate) fn push(&self, data: &[u8]) -> Result<PushOutcome, LogError> {
        match &self.policy {
            PushPolicy::Ring => {
                self.push_ring(data);
                Ok(PushOutcome::Done)
            }
            PushPolicy::NoWrap => self.push_no_wrap(data),
            PushPolicy::Discard => Ok(PushOutcome::Done),
            PushPolicy::Console(target) => {
                console::emit(target.as_ref(), data);
                Ok(PushOutcome::Done)
            }
        }
    }

    fn push_ring(&self, data: &[u8]) {
        match self.flags.locking {
            LockingMode::None => {
                let start = self.advance_ring_cursor(data.len());
                self.copy_ring(start, data);
            }
            LockingMode::StateOnly => {
                let start = {
                    let _guard = self.state_lock.lock();
                    self.advance_ring_cursor(data.len())
                };
                self.copy_ring(start, data);
            }
            LockingMode::Full => {
                let _guard = self.state_lock.lock();
                let start = self.advance_ring_cursor(data.len());
                self.copy_ring(start, data);
            }
        }
    }

    /// Advance the ring cursor by `len`, accounting full wrap-arounds,
    /// and return the previous cursor.
    fn advance_ring_cursor(&self, len: usize) -> usize {
        let start = self.cursor.load(Ordering::Relaxed);
        let wraps = ((start + len) / self.capacity) as u64;
        self.cursor
            .store((start + len) % self.capacity, Ordering::Release);
        if wraps > 0 {
            self.overflow_count.fetch_add(wraps, Ordering::Relaxed);
        }
        start
    }

    /// Split ring copy: at most two contiguous copies, tail then head.
    /// For a write larger than the whole payload only the last
    /// `capacity` bytes survive, exactly as if every byte had been
    /// written in sequence.
    fn copy_ring(&self, start: usize, data: &[u8]) {
        let effective = if data.len() >= self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let start = (start + (data.len() - effective.len())) % self.capacity;
        let first = effective.len().min(self.capacity - start);
        // SAFETY: `start + first <= capacity` and the remainder fits at
        // the head; interleaving with other writers is permitted by the
        // relaxed locking modes.
        unsafe {
            let base = (*self.payload.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(effective.as_ptr(), base.add(start), first);
            std::ptr::copy_nonoverlapping(
                effective.as_ptr().add(first),
                base,
                effective.len() - first,
            );
        }
    }

    fn push_no_wrap(&self, data: &[u8]) -> Result<PushOutcome, LogError> {
        match self.flags.locking {
            LockingMode::None => {
                let start = self.cursor.load(Ordering::Relaxed);
                if !self.no_wrap_fits(start, data.len()) {
                    return self.no_wrap_overflow(start, data.len());
                }
                self.cursor.store(start + data.len(), Ordering::Release);
                self.copy_at(start, data);
                Ok(PushOutcome::Done)
            }
            LockingMode::StateOnly => {
                let claimed = {
                    let _guard = self.state_lock.lock();
                    let start = self.cursor.load(Ordering::Relaxed);
                    if self.no_wrap_fits(start, data.len()) {
                        self.cursor.store(start + data.len(), Ordering::Release);
                        Ok(start)
                    } else {
                        Err(start)
                    }
                };
                match claimed {
                    Ok(start) => {
                        self.copy_at(start, data);
                        Ok(PushOutcome::Done)
                    }
                    Err(start) => self.no_wrap_overflow(start, data.len()),
                }
            }
            LockingMode::Full => {
                let _guard = self.state_lock.lock();
                let start = self.cursor.load(Ordering::Relaxed);
                if !self.no_wrap_fits(start, data.len()) {
                    return self.no_wrap_overflow(start, data.len());
                }
                self.cursor.store(start + data.len(), Ordering::Release);
                self.copy_at(start, data);
                Ok(PushOutcome::Done)
            }
        }
    }

    fn no_wrap_fits(&self, start: usize, len: usize) -> bool {
        start + len < self.capacity
    }

    fn no_wrap_overflow(&self, start: usize, len: usize) -> Result<PushOutcome, LogError> {
        if self.flags.expandable {
            Ok(PushOutcome::NeedsGrowth)
        } else {
            Err(LogError::BufferTooSmall {
                needed: start + len,
                available: self.capacity,
            })
        }
    }

    fn copy_at(&self, offset: usize, data: &[u8]) {
        // SAFETY: the caller established `offset + data.len()` within the
        // payload before claiming the cursor range.
        unsafe {
            let base = (*self.payload.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset), data.len());
        }
    }

    /// Copy raw payload bytes out, under the state lock. Bounds are
    /// validated by the caller against `capacity`.
    pub(crate) fn read_at(&self, offset: usize, dest: &mut [u8]) {
        let _guard = self.state_lock.lock();
        // SAFETY: `offset + dest.len() <= capacity`, checked by the caller.
        unsafe {
            let base = (*self.payload.get()).as_ptr();
            std::ptr::copy_nonoverlapping(base.add(offset), dest.as_mut_ptr(), dest.len());
        }
    }
}
