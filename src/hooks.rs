//! Collaborator boundaries: payload allocation, crash-dump capture, and
//! growth gating.
//!
//! The core never assumes a particular allocation strategy beyond the
//! paged/non-paged split; production defaults live here and tests inject
//! their own implementations.

/// Supplies zero-filled payload memory from the paged or non-paged class.
pub trait PayloadAllocator: Send + Sync {
    /// Allocate `len` zero-filled bytes. Returns `None` when the allocator
    /// is exhausted; the matching free is the `Drop` of the returned box.
    fn allocate(&self, len: usize, non_paged: bool) -> Option<Box<[u8]>>;
}

/// Default allocator: the process heap for both classes.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl PayloadAllocator for HeapAllocator {
    fn allocate(&self, len: usize, _non_paged: bool) -> Option<Box<[u8]>> {
        Some(vec![0u8; len].into_boxed_slice())
    }
}

/// Out-of-band capture bookkeeping for crash-dump consumers.
///
/// `register` and `unregister` are invoked exactly once each per buffer
/// object carrying the crash-dump flag. A growth retires the old object's
/// id and registers the replacement.
pub trait CrashDumpSink: Send + Sync {
    fn register(&self, buffer_id: u64, len: usize);
    fn unregister(&self, buffer_id: u64);
}

/// Default sink: no crash-dump collaborator wired.
#[derive(Debug, Default)]
pub struct NoopCrashDump;

impl CrashDumpSink for NoopCrashDump {
    fn register(&self, _buffer_id: u64, _len: usize) {}
    fn unregister(&self, _buffer_id: u64) {}
}

/// Context-safety predicate consulted before allocating during a growth.
pub trait GrowthGate: Send + Sync {
    /// Whether the calling context may allocate from the given class
    /// right now (e.g. not inside an interrupt-like context).
    fn is_growth_safe(&self, non_paged: bool) -> bool;
}

/// Default gate: every calling context is allocation-safe.
#[derive(Debug, Default)]
pub struct AlwaysSafe;

impl GrowthGate for AlwaysSafe {
    fn is_growth_safe(&self, _non_paged: bool) -> bool {
        true
    }
}
