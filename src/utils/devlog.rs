//! Per-operation bench records at the developer "level 6".
//!
//! Every terminal builder call emits one JSON object through [`bench`]. The line
//! goes to the `scoop::dev6` log target and, when a test has switched it on, to a
//! thread-local capture buffer so assertions never race on the global logger.

use serde::Serialize;
use std::cell::RefCell;

/// Pseudo-level for developer logs.
pub const DEV_LEVEL: u32 = 6;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// One terminal operation, as written to the dev log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchRecord<'a> {
    pub bench: &'static str,
    pub op: &'a str,
    pub collection: &'a str,
    pub duration_ms: u64,
    pub result_count: u64,
}

/// Turns capture off for this thread when dropped.
#[must_use = "capture stops as soon as the guard is dropped"]
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Starts capturing dev lines emitted on the current thread.
pub fn enable_thread_sink() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

/// Appends `line` to this thread's capture buffer, if capture is on.
pub fn write_str(line: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Takes every captured line; empty when capture is off.
pub fn drain() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Like [`drain`], keeping only lines that parse as JSON.
pub fn drain_json() -> Vec<serde_json::Value> {
    drain().iter().filter_map(|l| serde_json::from_str(l).ok()).collect()
}

/// Emits the record for one terminal operation.
pub fn bench(op: &str, collection: &str, duration_ms: u64, result_count: u64) {
    let record = BenchRecord { bench: "scoop", op, collection, duration_ms, result_count };
    match serde_json::to_string(&record) {
        Ok(line) => crate::dev6!("{line}"),
        Err(e) => log::warn!("unserializable bench record for {op}: {e}"),
    }
}

/// Writes a developer line to the capture buffer and the `scoop::dev6` target.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::devlog::write_str(&__line);
        log::log!(target: $crate::utils::logger::DEV6_TARGET, log::Level::Trace, "{}", __line);
    }};
}
