//! Packed snapshot wire format for crash-dump consumers.
//!
//! A snapshot is a byte-exact capture of one buffer: a fixed little-endian
//! header (including the cursor and ring overflow count) followed by the
//! raw payload verbatim. Layout:
//!
//! `[magic: u32][version: u16][kind: u8][locking: u8][bits: u8][pad: u8 x3]`
//! `[tag: u32][capacity: u64][cursor: u64][overflow: u64][payload...]`

use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::flags::{BufferFlags, BufferKind, LockingMode};

/// `"DLOG"` in little-endian byte order.
pub const SNAPSHOT_MAGIC: u32 = 0x474F_4C44;

/// Current wire format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Fixed header length preceding the payload.
pub const SNAPSHOT_HEADER_LEN: usize = 40;

const BIT_EXPANDABLE: u8 = 1 << 0;
const BIT_NON_PAGED: u8 = 1 << 1;
const BIT_CRASH_DUMP: u8 = 1 << 2;
const BIT_DISABLED: u8 = 1 << 3;

fn kind_code(kind: BufferKind) -> u8 {
    match kind {
        BufferKind::Ring => 0,
        BufferKind::NoWrap => 1,
        BufferKind::SystemLog => 2,
    }
}

fn locking_code(locking: LockingMode) -> u8 {
    match locking {
        LockingMode::None => 0,
        LockingMode::StateOnly => 1,
        LockingMode::Full => 2,
    }
}

/// Write the fixed header into `dest`, which must hold at least
/// [`SNAPSHOT_HEADER_LEN`] bytes (checked by the caller).
pub(crate) fn write_header(
    dest: &mut [u8],
    tag: u32,
    flags: BufferFlags,
    disabled: bool,
    capacity: usize,
    cursor: usize,
    overflow: u64,
) {
    let mut bits = 0u8;
    if flags.expandable {
        bits |= BIT_EXPANDABLE;
    }
    if flags.non_paged {
        bits |= BIT_NON_PAGED;
    }
    if flags.crash_dump {
        bits |= BIT_CRASH_DUMP;
    }
    if disabled {
        bits |= BIT_DISABLED;
    }
    dest[0..4].copy_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
    dest[4..6].copy_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    dest[6] = kind_code(flags.kind);
    dest[7] = locking_code(flags.locking);
    dest[8] = bits;
    dest[9..12].fill(0);
    dest[12..16].copy_from_slice(&tag.to_le_bytes());
    dest[16..24].copy_from_slice(&(capacity as u64).to_le_bytes());
    dest[24..32].copy_from_slice(&(cursor as u64).to_le_bytes());
    dest[32..40].copy_from_slice(&overflow.to_le_bytes());
}

/// Decoded snapshot: header fields plus the payload verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub tag: u32,
    pub flags: BufferFlags,
    pub disabled: bool,
    pub cursor: usize,
    pub overflow_count: u64,
    pub payload: Vec<u8>,
}

impl BufferSnapshot {
    /// Decode a snapshot produced by `LogRegistry::snapshot`.
    pub fn decode(bytes: &[u8]) -> Result<Self, LogError> {
        if bytes.len() < SNAPSHOT_HEADER_LEN {
            return Err(LogError::InvalidArgument("snapshot shorter than header"));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != SNAPSHOT_MAGIC {
            return Err(LogError::InvalidArgument("snapshot magic mismatch"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(LogError::InvalidArgument("unsupported snapshot version"));
        }
        let kind = match bytes[6] {
            0 => BufferKind::Ring,
            1 => BufferKind::NoWrap,
            2 => BufferKind::SystemLog,
            _ => return Err(LogError::InvalidArgument("unknown buffer kind")),
        };
        let locking = match bytes[7] {
            0 => LockingMode::None,
            1 => LockingMode::StateOnly,
            2 => LockingMode::Full,
            _ => return Err(LogError::InvalidArgument("unknown locking mode")),
        };
        let bits = bytes[8];
        let tag = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let capacity = read_u64(&bytes[16..24]) as usize;
        let cursor = read_u64(&bytes[24..32]) as usize;
        let overflow_count = read_u64(&bytes[32..40]);
        if bytes.len() != SNAPSHOT_HEADER_LEN + capacity {
            return Err(LogError::InvalidArgument("snapshot length mismatch"));
        }
        Ok(Self {
            tag,
            flags: BufferFlags {
                kind,
                locking,
                expandable: bits & BIT_EXPANDABLE != 0,
                non_paged: bits & BIT_NON_PAGED != 0,
                crash_dump: bits & BIT_CRASH_DUMP != 0,
            },
            disabled: bits & BIT_DISABLED != 0,
            cursor,
            overflow_count,
            payload: bytes[SNAPSHOT_HEADER_LEN..].to_vec(),
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut flags = BufferFlags::expandable();
        flags.crash_dump = true;
        let mut dest = vec![0u8; SNAPSHOT_HEADER_LEN + 4];
        write_header(&mut dest, 0xBEEF, flags, false, 4, 3, 7);
        dest[SNAPSHOT_HEADER_LEN..].copy_from_slice(b"ABCD");

        let snap = BufferSnapshot::decode(&dest).unwrap();
        assert_eq!(snap.tag, 0xBEEF);
        assert_eq!(snap.flags, flags);
        assert_eq!(snap.cursor, 3);
        assert_eq!(snap.overflow_count, 7);
        assert_eq!(snap.payload, b"ABCD");
        assert!(!snap.disabled);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut dest = vec![0u8; SNAPSHOT_HEADER_LEN];
        write_header(&mut dest, 0, BufferFlags::system_log(), false, 0, 0, 0);
        dest[0] ^= 0xFF;
        assert!(BufferSnapshot::decode(&dest).is_err());
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut dest = vec![0u8; SNAPSHOT_HEADER_LEN + 2];
        write_header(&mut dest, 0, BufferFlags::ring(LockingMode::Full), false, 8, 0, 0);
        assert!(BufferSnapshot::decode(&dest).is_err());
    }
}
