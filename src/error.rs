//! Error types for the log buffering core.
//!
//! Every error is returned to the immediate caller; nothing is retried
//! inside the core. Best-effort diagnostic callers may drop the kinds
//! flagged by [`LogError::is_droppable`]; registration callers must treat
//! every error as fatal to that call.

use thiserror::Error;

/// Errors that can occur in registry and buffer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Buffer has no payload storage")]
    InvalidPointer,

    #[error("Invalid handle: {0}")]
    InvalidHandle(usize),

    #[error("Registry full: {occupied}/{max} slots occupied")]
    InsufficientResources { occupied: usize, max: usize },

    #[error("Allocation of {0} bytes failed")]
    NoMemory(usize),

    #[error("Buffer is paused or being torn down")]
    NotReady,

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Offset {offset} out of range for payload of {len} bytes")]
    OutOfRange { offset: usize, len: usize },
}

impl LogError {
    /// Returns true if a best-effort diagnostic caller may silently drop
    /// the write that produced this error.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::NotReady | Self::BufferTooSmall { .. })
    }
}
