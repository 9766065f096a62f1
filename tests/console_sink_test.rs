//! TDD-Light tests for the console sink encoding.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;

use diaglog_core::{
    AlwaysSafe, ConsoleTarget, HeapAllocator, LogRegistry, NoopCrashDump, RegistryConfig,
    SentinelMode, CONSOLE_LINE_CHARS, CONSOLE_LINE_TAG, SENTINEL_HANDLE,
};

#[derive(Default)]
struct CaptureConsole {
    lines: Mutex<Vec<(String, String)>>,
}

impl CaptureConsole {
    fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut self.lines.lock().unwrap())
    }
}

impl ConsoleTarget for CaptureConsole {
    fn write_line(&self, tag: &str, line: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((tag.to_string(), line.to_string()));
    }
}

fn console_registry() -> (LogRegistry, Arc<CaptureConsole>) {
    let console = Arc::new(CaptureConsole::default());
    let registry = LogRegistry::with_collaborators(
        RegistryConfig {
            sentinel: SentinelMode::Console,
            ..RegistryConfig::default()
        },
        Arc::new(HeapAllocator),
        Arc::new(NoopCrashDump),
        Arc::new(AlwaysSafe),
        console.clone(),
    );
    (registry, console)
}

fn decode_call(lines: &[(String, String)]) -> Vec<u8> {
    // Reconstruction contract: concatenate every line of the call, in
    // order, before decoding; padding only appears at the true end.
    let joined: String = lines.iter().map(|(_, l)| l.as_str()).collect();
    STANDARD.decode(joined).unwrap()
}

#[test]
fn round_trips_arbitrary_binary_input() {
    let (registry, console) = console_registry();
    let mut rng = rand::thread_rng();

    for len in [1usize, 3, 47, 48, 49, 64, 200, 1000] {
        let input: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        registry.append(SENTINEL_HANDLE, &input).unwrap();

        let lines = console.take();
        assert_eq!(decode_call(&lines), input, "len {len}");
    }
}

#[test]
fn lines_are_tagged_and_bounded() {
    let (registry, console) = console_registry();

    registry.append(SENTINEL_HANDLE, &[0x5A; 300]).unwrap();

    let lines = console.take();
    assert!(lines.len() > 1);
    for (tag, line) in &lines {
        assert_eq!(tag, CONSOLE_LINE_TAG);
        assert!(line.len() <= CONSOLE_LINE_CHARS);
    }
    for (_, line) in lines.iter().take(lines.len() - 1) {
        assert_eq!(line.len(), CONSOLE_LINE_CHARS);
        assert!(!line.contains('='));
    }
}

#[test]
fn each_call_is_its_own_encoding_unit() {
    let (registry, console) = console_registry();

    registry.append(SENTINEL_HANDLE, b"first call").unwrap();
    let first = console.take();
    registry.append(SENTINEL_HANDLE, b"second").unwrap();
    let second = console.take();

    assert_eq!(decode_call(&first), b"first call");
    assert_eq!(decode_call(&second), b"second");
}

#[test]
fn console_sentinel_never_reports_backpressure() {
    let (registry, console) = console_registry();

    for _ in 0..64 {
        registry.append(SENTINEL_HANDLE, &[0u8; 512]).unwrap();
    }
    assert!(!console.take().is_empty());
}
