//! Developer trace lines ("dev6") with a thread-local capture buffer.
//!
//! Query execution emits one JSON line per backend round trip. Tests enable the
//! buffer on their own thread and assert on what was issued without touching
//! the global logger.

use std::cell::RefCell;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables capture for the current thread when dropped.
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Start capturing dev6 lines emitted on this thread.
#[must_use]
pub fn capture() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

#[doc(hidden)]
pub fn record(line: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Take every captured line, leaving the buffer empty.
pub fn drain() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Captured lines whose `"op"` field equals `op`.
pub fn lines_for(op: &str) -> Vec<String> {
    let needle = format!("\"op\":\"{op}\"");
    CAPTURE.with(|c| {
        c.borrow()
            .as_ref()
            .map(|buf| buf.iter().filter(|l| l.contains(&needle)).cloned().collect())
            .unwrap_or_default()
    })
}

/// Emit a developer trace line and capture it on this thread if enabled.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::devlog::record(&__line);
        log::log!(target: "nexusodm::dev6", log::Level::Trace, "{}", __line);
    }};
}
