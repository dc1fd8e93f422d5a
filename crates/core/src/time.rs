//! Time sources for command and event timestamps.

use chrono::Utc;

/// Supplies the logical time stamped on commands and events.
///
/// Times are microseconds since the Unix epoch by convention; the engine only
/// copies them around and never interprets them.
pub trait TimeSource: Send {
    fn now(&self) -> i64;
}

/// Wall-clock time in microseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> i64 {
        Utc::now().timestamp_micros()
    }
}

impl<F> TimeSource for F
where
    F: Fn() -> i64 + Send,
{
    fn now(&self) -> i64 {
        self()
    }
}
