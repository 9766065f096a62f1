//! Process-wide table of policied log buffers, indexed by opaque handles.
//!
//! The table lock guards slot occupancy and the free-slot hints only; it
//! is never held across the byte copy of an append. The extraction paths
//! deliberately trade concurrency for consistency and hold it.
//!
//! Appends may be called from contexts where sleeping is illegal, so the
//! two waiting operations here (teardown quiescence and growth hand-off)
//! spin with a scheduler yield and never block on a wait queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::{LogBuffer, PushOutcome, PushPolicy};
use crate::console::{ConsoleTarget, StdoutConsole};
use crate::error::LogError;
use crate::flags::{BufferFlags, BufferKind};
use crate::hooks::{AlwaysSafe, CrashDumpSink, GrowthGate, HeapAllocator, PayloadAllocator};
use crate::snapshot::{self, SNAPSHOT_HEADER_LEN};

/// Opaque index into the registry's slot table.
pub type Handle = usize;

/// The permanently reserved sentinel buffer.
pub const SENTINEL_HANDLE: Handle = 0;

/// Policy behind the sentinel buffer at handle 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelMode {
    /// Sentinel discards all input.
    Discard,
    /// Sentinel forwards input to the console target.
    Console,
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of simultaneously registered buffers, sentinel
    /// included.
    pub max_buffers: usize,
    /// Policy of the built-in sentinel at handle 0.
    pub sentinel: SentinelMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_buffers: 32,
            sentinel: SentinelMode::Discard,
        }
    }
}

/// Occupancy counters exported to diagnostic consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub occupied: usize,
    pub free: usize,
    pub max_buffers: usize,
}

struct SlotTable {
    slots: Vec<Option<Arc<LogBuffer>>>,
    /// Lowest index a free-slot scan may start from. Best-effort cache,
    /// not a hard invariant.
    next_free_hint: usize,
    total_free_count: usize,
}

/// Process-wide registry of log buffers.
///
/// Explicitly constructed and passed by reference; [`LogRegistry::global`]
/// offers the create-once process singleton for callers that want it.
pub struct LogRegistry {
    table: Mutex<SlotTable>,
    next_id: AtomicU64,
    allocator: Arc<dyn PayloadAllocator>,
    crash_dump: Arc<dyn CrashDumpSink>,
    growth_gate: Arc<dyn GrowthGate>,
}

impl LogRegistry {
    /// Create a registry with production collaborators and install the
    /// sentinel buffer at handle 0.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(HeapAllocator),
            Arc::new(crate::hooks::NoopCrashDump),
            Arc::new(AlwaysSafe),
            Arc::new(StdoutConsole),
        )
    }

    /// Create a registry with injected collaborators.
    pub fn with_collaborators(
        config: RegistryConfig,
        allocator: Arc<dyn PayloadAllocator>,
        crash_dump: Arc<dyn CrashDumpSink>,
        growth_gate: Arc<dyn GrowthGate>,
        console: Arc<dyn ConsoleTarget>,
    ) -> Self {
        let max_buffers = config.max_buffers.max(1);
        let next_id = AtomicU64::new(1);

        let sentinel_policy = match config.sentinel {
            SentinelMode::Discard => PushPolicy::Discard,
            SentinelMode::Console => PushPolicy::Console(console),
        };
        let sentinel = Arc::new(LogBuffer::new(
            0,
            0,
            BufferFlags::system_log(),
            sentinel_policy,
            Box::default(),
        ));

        let mut slots = vec![None; max_buffers];
        slots[SENTINEL_HANDLE] = Some(sentinel);

        Self {
            table: Mutex::new(SlotTable {
                slots,
                next_free_hint: 1,
                total_free_count: max_buffers - 1,
            }),
            next_id,
            allocator,
            crash_dump,
            growth_gate,
        }
    }

    /// The idempotent process-wide instance with default configuration.
    pub fn global() -> &'static Arc<LogRegistry> {
        static GLOBAL: OnceLock<Arc<LogRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(LogRegistry::new(RegistryConfig::default())))
    }

    /// Register a buffer of `size` bytes under the given policy flags.
    ///
    /// The free-slot check runs before any backing allocation so resource
    /// pressure is not made worse by wasted allocation work.
    pub fn register_buffer(
        &self,
        size: usize,
        flags: BufferFlags,
        tag: u32,
    ) -> Result<Handle, LogError> {
        flags.validate(size)?;
        // SystemLog buffers are zero-cost sinks regardless of requested size.
        let size = if flags.kind == BufferKind::SystemLog { 0 } else { size };

        {
            let table = self.table.lock();
            if table.total_free_count == 0 {
                return Err(LogError::InsufficientResources {
                    occupied: table.slots.len(),
                    max: table.slots.len(),
                });
            }
        }

        let payload = if size > 0 {
            self.allocator
                .allocate(size, flags.non_paged)
                .ok_or(LogError::NoMemory(size))?
        } else {
            Box::default()
        };

        let policy = match flags.kind {
            BufferKind::Ring => PushPolicy::Ring,
            BufferKind::NoWrap => PushPolicy::NoWrap,
            BufferKind::SystemLog => PushPolicy::Discard,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(LogBuffer::new(id, tag, flags, policy, payload));

        // Registered before the handle is published so the capture path
        // never misses a live buffer.
        if flags.crash_dump {
            self.crash_dump.register(id, SNAPSHOT_HEADER_LEN + size);
        }

        let installed = {
            let mut table = self.table.lock();
            let start = table.next_free_hint;
            let found = (start..table.slots.len()).find(|&i| table.slots[i].is_none());
            if let Some(handle) = found {
                table.slots[handle] = Some(buffer.clone());
                table.total_free_count -= 1;
                table.next_free_hint = (handle + 1..table.slots.len())
                    .find(|&i| table.slots[i].is_none())
                    .unwrap_or(table.slots.len());
                Some(handle)
            } else {
                None
            }
        };

        match installed {
            Some(handle) => {
                debug!(handle, tag, size, ?flags, "registered log buffer");
                Ok(handle)
            }
            None => {
                // Lost a race with another creator despite the earlier check.
                if flags.crash_dump {
                    self.crash_dump.unregister(id);
                }
                let max = self.table.lock().slots.len();
                Err(LogError::InsufficientResources { occupied: max, max })
            }
        }
    }

    /// Append `data` to the buffer behind `handle` under its policy.
    pub fn append(&self, handle: Handle, data: &[u8]) -> Result<(), LogError> {
        if data.is_empty() {
            return Err(LogError::InvalidArgument("zero-length write"));
        }
        let mut buf = self.buffer(handle)?;
        if !buf.begin_write() {
            return Err(LogError::NotReady);
        }
        loop {
            match buf.push(data) {
                Ok(PushOutcome::Done) => {
                    buf.end_write();
                    return Ok(());
                }
                Ok(PushOutcome::NeedsGrowth) => match self.grow(&buf) {
                    Ok(replacement) => {
                        let entered = replacement.begin_write();
                        // Wait out every other in-flight writer on the old
                        // object before releasing our claim on it. Spin,
                        // never sleep: each wait is bounded by the copies
                        // those writers are finishing.
                        while buf.live_writers() > 1 {
                            std::thread::yield_now();
                        }
                        buf.end_write();
                        if !entered {
                            return Err(LogError::NotReady);
                        }
                        buf = replacement;
                    }
                    Err(err) => {
                        buf.end_write();
                        return Err(err);
                    }
                },
                Err(err) => {
                    buf.end_write();
                    return Err(err);
                }
            }
        }
    }

    /// Double the capacity of an expandable buffer by installing a
    /// replacement object in its slot. The losing side of a swap race
    /// reports failure instead of retrying; the caller owns the retry
    /// decision.
    fn grow(&self, old: &Arc<LogBuffer>) -> Result<Arc<LogBuffer>, LogError> {
        let flags = old.flags();
        if !self.growth_gate.is_growth_safe(flags.non_paged) {
            return Err(LogError::BufferTooSmall {
                needed: old.capacity() * 2,
                available: old.capacity(),
            });
        }
        let new_capacity = old.capacity() * 2;
        // Allocation happens outside every lock.
        let payload = self
            .allocator
            .allocate(new_capacity, flags.non_paged)
            .ok_or(LogError::NoMemory(new_capacity))?;
        let new_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let replacement = {
            let mut table = self.table.lock();
            let position = table
                .slots
                .iter()
                .position(|s| matches!(s, Some(b) if Arc::ptr_eq(b, old)));
            let Some(handle) = position else {
                drop(table);
                debug!(id = old.id(), "grow lost the swap race; replacement already installed");
                return Err(LogError::BufferTooSmall {
                    needed: new_capacity,
                    available: old.capacity(),
                });
            };
            let replacement = Arc::new(old.successor(new_id, payload));
            table.slots[handle] = Some(replacement.clone());
            debug!(handle, from = old.capacity(), to = new_capacity, "grew expandable buffer");
            replacement
        };

        if flags.crash_dump {
            self.crash_dump.unregister(old.id());
            self.crash_dump
                .register(replacement.id(), SNAPSHOT_HEADER_LEN + new_capacity);
        }
        Ok(replacement)
    }

    /// Retire a handle. A benign no-op on the sentinel or an invalid
    /// handle; otherwise blocks (spinning, never sleeping) until every
    /// in-flight append against the buffer has drained.
    pub fn deallocate(&self, handle: Handle) {
        if handle == SENTINEL_HANDLE {
            return;
        }
        loop {
            let buf = {
                let table = self.table.lock();
                match table.slots.get(handle).and_then(|s| s.clone()) {
                    Some(buf) => buf,
                    None => return,
                }
            };
            buf.set_disabled(true);
            while buf.live_writers() > 0 {
                std::thread::yield_now();
            }
            let removed = {
                let mut table = self.table.lock();
                let same = matches!(&table.slots[handle], Some(current) if Arc::ptr_eq(current, &buf));
                if same {
                    table.slots[handle] = None;
                    table.total_free_count += 1;
                    table.next_free_hint = table.next_free_hint.min(handle);
                }
                // Not the same object: a concurrent growth swapped the
                // slot; loop around and retarget the replacement.
                same
            };
            if removed {
                if buf.flags().crash_dump {
                    self.crash_dump.unregister(buf.id());
                }
                debug!(handle, tag = buf.tag(), "deallocated log buffer");
                return;
            }
        }
    }

    /// First occupied slot carrying `tag`, lowest handle wins. Tags are
    /// caller-chosen and not unique.
    pub fn lookup_by_tag(&self, tag: u32) -> Option<Handle> {
        let table = self.table.lock();
        table
            .slots
            .iter()
            .position(|s| matches!(s, Some(b) if b.tag() == tag))
    }

    /// Pause or resume writes to one buffer.
    pub fn pause(&self, handle: Handle, paused: bool) -> Result<(), LogError> {
        self.buffer(handle)?.set_disabled(paused);
        Ok(())
    }

    /// Pause or resume writes to every registered buffer.
    pub fn pause_all(&self, paused: bool) {
        let buffers: Vec<_> = {
            let table = self.table.lock();
            table.slots.iter().flatten().cloned().collect()
        };
        for buf in buffers {
            buf.set_disabled(paused);
        }
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        let table = self.table.lock();
        table.slots.get(handle).map_or(false, |s| s.is_some())
    }

    pub fn size(&self, handle: Handle) -> Result<usize, LogError> {
        Ok(self.buffer(handle)?.capacity())
    }

    pub fn flags(&self, handle: Handle) -> Result<BufferFlags, LogError> {
        Ok(self.buffer(handle)?.flags())
    }

    pub fn tag(&self, handle: Handle) -> Result<u32, LogError> {
        Ok(self.buffer(handle)?.tag())
    }

    pub fn cursor(&self, handle: Handle) -> Result<usize, LogError> {
        Ok(self.buffer(handle)?.cursor())
    }

    /// Ring buffers only: number of full wrap-arounds observed.
    pub fn overflow_count(&self, handle: Handle) -> Result<u64, LogError> {
        Ok(self.buffer(handle)?.overflow_count())
    }

    /// In-flight append count, for diagnostics and teardown tests.
    pub fn writer_count(&self, handle: Handle) -> Result<u32, LogError> {
        Ok(self.buffer(handle)?.live_writers())
    }

    /// Occupancy counters for diagnostic consumers.
    pub fn stats(&self) -> RegistryStats {
        let table = self.table.lock();
        let max_buffers = table.slots.len();
        RegistryStats {
            occupied: max_buffers - table.total_free_count,
            free: table.total_free_count,
            max_buffers,
        }
    }

    /// Copy up to `chunk_size` bytes starting at raw payload offset
    /// `chunk_index * chunk_size` into `dest`. Returns the number of
    /// bytes copied, which may be short at the tail. Held under the table
    /// lock for consistency; the buffer's own relaxed locking modes are
    /// not honored here.
    pub fn extract_chunk(
        &self,
        handle: Handle,
        chunk_index: usize,
        chunk_size: usize,
        dest: &mut [u8],
    ) -> Result<usize, LogError> {
        if chunk_size == 0 {
            return Err(LogError::InvalidArgument("zero chunk size"));
        }
        let table = self.table.lock();
        let buf = table
            .slots
            .get(handle)
            .and_then(|s| s.as_ref())
            .ok_or(LogError::InvalidHandle(handle))?;
        if buf.capacity() == 0 {
            return Err(LogError::InvalidPointer);
        }
        let offset = chunk_index
            .checked_mul(chunk_size)
            .ok_or(LogError::OutOfRange {
                offset: usize::MAX,
                len: buf.capacity(),
            })?;
        if offset > buf.capacity() {
            return Err(LogError::OutOfRange {
                offset,
                len: buf.capacity(),
            });
        }
        let n = chunk_size.min(buf.capacity() - offset);
        if n == 0 {
            return Ok(0);
        }
        if dest.len() < n {
            return Err(LogError::BufferTooSmall {
                needed: n,
                available: dest.len(),
            });
        }
        buf.read_at(offset, &mut dest[..n]);
        Ok(n)
    }

    /// Byte-exact capture of header + payload into `dest`; see the
    /// `snapshot` module for the wire layout. Returns the bytes written.
    pub fn snapshot(&self, handle: Handle, dest: &mut [u8]) -> Result<usize, LogError> {
        let table = self.table.lock();
        let buf = table
            .slots
            .get(handle)
            .and_then(|s| s.as_ref())
            .ok_or(LogError::InvalidHandle(handle))?;
        let total = SNAPSHOT_HEADER_LEN + buf.capacity();
        if dest.len() < total {
            return Err(LogError::BufferTooSmall {
                needed: total,
                available: dest.len(),
            });
        }
        snapshot::write_header(
            &mut dest[..SNAPSHOT_HEADER_LEN],
            buf.tag(),
            buf.flags(),
            buf.is_disabled(),
            buf.capacity(),
            buf.cursor(),
            buf.overflow_count(),
        );
        if buf.capacity() > 0 {
            buf.read_at(0, &mut dest[SNAPSHOT_HEADER_LEN..total]);
        }
        Ok(total)
    }

    /// Exact destination size a `snapshot` of this handle requires.
    pub fn snapshot_len(&self, handle: Handle) -> Result<usize, LogError> {
        Ok(SNAPSHOT_HEADER_LEN + self.buffer(handle)?.capacity())
    }

    fn buffer(&self, handle: Handle) -> Result<Arc<LogBuffer>, LogError> {
        let table = self.table.lock();
        table
            .slots
            .get(handle)
            .and_then(|s| s.clone())
            .ok_or(LogError::InvalidHandle(handle))
    }
}

impl Drop for LogRegistry {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        for slot in table.slots.iter().flatten() {
            if slot.live_writers() > 0 {
                warn!(id = slot.id(), "registry dropped with writers in flight");
            }
            if slot.flags().crash_dump {
                self.crash_dump.unregister(slot.id());
            }
        }
    }
}
