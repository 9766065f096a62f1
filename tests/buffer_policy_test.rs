//! TDD-Light tests for the buffer storage policies.

use diaglog_core::{
    BufferFlags, LockingMode, LogError, LogRegistry, RegistryConfig,
};

fn registry() -> LogRegistry {
    LogRegistry::new(RegistryConfig::default())
}

fn raw_payload(registry: &LogRegistry, handle: usize, capacity: usize) -> Vec<u8> {
    let mut out = vec![0u8; capacity];
    let n = registry.extract_chunk(handle, 0, capacity, &mut out).unwrap();
    assert_eq!(n, capacity);
    out
}

/// Read the logical content of a ring buffer: raw payload starting at the
/// cursor, wrapping once.
fn logical_ring_content(registry: &LogRegistry, handle: usize, capacity: usize) -> Vec<u8> {
    let raw = raw_payload(registry, handle, capacity);
    let cursor = registry.cursor(handle).unwrap();
    let mut logical = raw[cursor..].to_vec();
    logical.extend_from_slice(&raw[..cursor]);
    logical
}

#[test]
fn ring_wraparound_exactness() {
    let registry = registry();
    let h = registry
        .register_buffer(16, BufferFlags::ring(LockingMode::Full), 1)
        .unwrap();

    registry.append(h, b"0123456789").unwrap();
    registry.append(h, b"ABCDEFGHIJ").unwrap();

    assert_eq!(registry.cursor(h).unwrap(), 4);
    assert_eq!(registry.overflow_count(h).unwrap(), 1);
    assert_eq!(logical_ring_content(&registry, h, 16), b"456789ABCDEFGHIJ");
}

#[test]
fn ring_holds_last_capacity_bytes_of_stream() {
    let registry = registry();
    let h = registry
        .register_buffer(16, BufferFlags::ring(LockingMode::Full), 1)
        .unwrap();

    let stream: Vec<u8> = (0u8..=99).collect();
    for chunk in stream.chunks(7) {
        registry.append(h, chunk).unwrap();
    }

    assert_eq!(
        logical_ring_content(&registry, h, 16),
        stream[stream.len() - 16..]
    );
}

#[test]
fn ring_oversized_single_write_wraps() {
    let registry = registry();
    let h = registry
        .register_buffer(8, BufferFlags::ring(LockingMode::Full), 1)
        .unwrap();

    let stream: Vec<u8> = (10u8..30).collect(); // 20 bytes into 8
    registry.append(h, &stream).unwrap();

    assert_eq!(registry.cursor(h).unwrap(), 20 % 8);
    assert_eq!(registry.overflow_count(h).unwrap(), 2);
    assert_eq!(logical_ring_content(&registry, h, 8), stream[12..]);
}

#[test]
fn ring_works_in_every_locking_mode() {
    for locking in [LockingMode::None, LockingMode::StateOnly, LockingMode::Full] {
        let registry = registry();
        let h = registry
            .register_buffer(4, BufferFlags::ring(locking), 1)
            .unwrap();

        registry.append(h, b"abcdef").unwrap();

        assert_eq!(registry.cursor(h).unwrap(), 2);
        assert_eq!(logical_ring_content(&registry, h, 4), b"cdef");
    }
}

#[test]
fn no_wrap_rejects_without_corruption() {
    let registry = registry();
    let h = registry
        .register_buffer(8, BufferFlags::no_wrap(LockingMode::Full), 1)
        .unwrap();

    registry.append(h, b"AAAAA").unwrap();
    assert_eq!(registry.cursor(h).unwrap(), 5);

    let err = registry.append(h, b"BBBBB").unwrap_err();
    assert!(matches!(err, LogError::BufferTooSmall { .. }));

    assert_eq!(registry.cursor(h).unwrap(), 5);
    assert_eq!(&raw_payload(&registry, h, 8)[..5], b"AAAAA");
}

#[test]
fn growth_preserves_data_and_order() {
    let registry = registry();
    let h = registry
        .register_buffer(8, BufferFlags::expandable(), 1)
        .unwrap();

    registry.append(h, b"AAAAA").unwrap();
    registry.append(h, b"BBBBB").unwrap();

    assert_eq!(registry.size(h).unwrap(), 16);
    assert_eq!(registry.cursor(h).unwrap(), 10);
    assert_eq!(&raw_payload(&registry, h, 16)[..10], b"AAAAABBBBB");
}

#[test]
fn growth_doubles_until_write_fits() {
    let registry = registry();
    let h = registry
        .register_buffer(4, BufferFlags::expandable(), 1)
        .unwrap();

    registry.append(h, b"AB").unwrap();
    registry.append(h, &[0x55u8; 20]).unwrap();

    // 2 + 20 bytes need strictly more than 16; two doublings from 4.
    assert_eq!(registry.size(h).unwrap(), 32);
    assert_eq!(registry.cursor(h).unwrap(), 22);
    let raw = raw_payload(&registry, h, 32);
    assert_eq!(&raw[..2], b"AB");
    assert_eq!(&raw[2..22], &[0x55u8; 20]);
}

#[test]
fn system_log_discards_and_succeeds() {
    let registry = registry();
    let h = registry
        .register_buffer(0, BufferFlags::system_log(), 9)
        .unwrap();

    registry.append(h, b"dropped on the floor").unwrap();

    assert_eq!(registry.size(h).unwrap(), 0);
}
