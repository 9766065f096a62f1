//! Console sink: re-encodes appends as printable base64 lines.
//!
//! Each append is encoded as one unit and emitted in 64-character lines
//! under a fixed, greppable prefix. Padding appears only at the true end
//! of the call's input, so reconstruction must concatenate the decoded
//! bytes of every line emitted by one call, in order, before interpreting
//! padding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Fixed prefix on every emitted line.
pub const CONSOLE_LINE_TAG: &str = "DIAGLOG";

/// Encoded characters per emitted line.
pub const CONSOLE_LINE_CHARS: usize = 64;

/// Line-oriented console output accepting `(tag, line)` pairs.
pub trait ConsoleTarget: Send + Sync {
    fn write_line(&self, tag: &str, line: &str);
}

/// Default target: standard output.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl ConsoleTarget for StdoutConsole {
    fn write_line(&self, tag: &str, line: &str) {
        println!("{tag}: {line}");
    }
}

/// Encode `data` and emit it to `target`. This sink cannot report
/// backpressure; it always succeeds.
pub(crate) fn emit(target: &dyn ConsoleTarget, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(CONSOLE_LINE_CHARS) {
        // Chunks of a base64 string are pure ASCII.
        let line = std::str::from_utf8(chunk).unwrap_or_default();
        target.write_line(CONSOLE_LINE_TAG, line);
    }
}
