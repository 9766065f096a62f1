//! diaglog-core
//!
//! An in-process, multi-reader/multi-writer log buffering engine: a
//! registry of named, independently-policied byte buffers with a
//! concurrent-safe append path and out-of-band extraction for diagnostic
//! and crash-reporting consumers.
//!
//! # Design constraints
//!
//! - **No sleeping**: appends may run in contexts where blocking is
//!   illegal. The only waits in the crate are scheduler-yielding spins,
//!   bounded by in-flight copies finishing.
//! - **Growth under fire**: expandable buffers double their capacity by
//!   swapping in a replacement object while other threads keep writing;
//!   `Arc` ownership makes freeing a still-referenced payload
//!   structurally impossible.
//! - **Caller-chosen safety**: each buffer picks its locking discipline
//!   at registration, from fully locked copies down to none at all.
//!
//! # Boundaries
//!
//! Formatting, emit filtering, crash-dump bookkeeping, and the concrete
//! paged/non-paged allocator are external collaborators behind the traits
//! in [`hooks`] and [`console`]. This crate owns no network transport,
//! persistence, or CLI surface.

mod buffer;
pub mod console;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod registry;
pub mod snapshot;

pub use console::{ConsoleTarget, StdoutConsole, CONSOLE_LINE_CHARS, CONSOLE_LINE_TAG};
pub use error::LogError;
pub use flags::{BufferFlags, BufferKind, LockingMode};
pub use hooks::{
    AlwaysSafe, CrashDumpSink, GrowthGate, HeapAllocator, NoopCrashDump, PayloadAllocator,
};
pub use registry::{
    Handle, LogRegistry, RegistryConfig, RegistryStats, SentinelMode, SENTINEL_HANDLE,
};
pub use snapshot::{BufferSnapshot, SNAPSHOT_HEADER_LEN, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
