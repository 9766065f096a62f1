//! Per-buffer policy flags, fixed at registration time.
//!
//! Illegal combinations are rejected by the registry before any backing
//! allocation is attempted.

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Storage strategy selected for a buffer at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferKind {
    /// Fixed capacity; overwrites its oldest data once full.
    Ring,
    /// Refuses to wrap; may double its capacity when expandable.
    NoWrap,
    /// Zero-capacity system sink (discard, or console on the sentinel).
    SystemLog,
}

/// Locking discipline for concurrent appends to a single buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockingMode {
    /// No synchronization; the caller asserts single-writer use.
    None,
    /// Lock held for cursor math only; concurrent copies may interleave.
    StateOnly,
    /// Lock held across cursor math and the entire byte copy.
    Full,
}

/// Immutable policy bits attached to a buffer at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferFlags {
    pub kind: BufferKind,
    pub locking: LockingMode,
    /// Doubling growth; legal only with `NoWrap` kind and `Full` locking.
    pub expandable: bool,
    /// Selects the allocator class for payload memory.
    pub non_paged: bool,
    /// Register header + payload with the crash-dump collaborator.
    pub crash_dump: bool,
}

impl BufferFlags {
    /// Flags for a ring buffer with the given locking mode.
    pub fn ring(locking: LockingMode) -> Self {
        Self {
            kind: BufferKind::Ring,
            locking,
            expandable: false,
            non_paged: false,
            crash_dump: false,
        }
    }

    /// Flags for a non-wrapping buffer with the given locking mode.
    pub fn no_wrap(locking: LockingMode) -> Self {
        Self {
            kind: BufferKind::NoWrap,
            locking,
            expandable: false,
            non_paged: false,
            crash_dump: false,
        }
    }

    /// Flags for an expandable non-wrapping buffer (forces `Full` locking).
    pub fn expandable() -> Self {
        Self {
            kind: BufferKind::NoWrap,
            locking: LockingMode::Full,
            expandable: true,
            non_paged: false,
            crash_dump: false,
        }
    }

    /// Flags for a zero-capacity system sink.
    pub fn system_log() -> Self {
        Self {
            kind: BufferKind::SystemLog,
            locking: LockingMode::None,
            expandable: false,
            non_paged: false,
            crash_dump: false,
        }
    }

    /// Validate this flag combination against the requested payload size.
    pub(crate) fn validate(&self, size: usize) -> Result<(), LogError> {
        if self.expandable
            && !(self.kind == BufferKind::NoWrap && self.locking == LockingMode::Full)
        {
            return Err(LogError::InvalidArgument(
                "expandable requires NoWrap kind and Full locking",
            ));
        }
        if size == 0 && self.kind != BufferKind::SystemLog {
            return Err(LogError::InvalidArgument(
                "zero-size payload is only legal for SystemLog buffers",
            ));
        }
        Ok(())
    }
}
