//! Append-only log boundary (mechanics only).
//!
//! The engine persists commands and events through these two narrow contracts
//! and makes no storage assumptions beyond them:
//!
//! - **Append order is poll order**: a poller sees records exactly in the order
//!   they were appended.
//! - **Opaque records**: the log stores whole encoded records and never looks
//!   inside them.
//! - **At-least-once**: a log may contain the same record twice after a crash
//!   mid-append; the event handler chain deduplicates by event sequence.

use chronicle_core::ChronicleResult;

/// Outcome of handling one polled record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Record consumed; advance to the next one.
    Poll,
    /// Record not consumed; deliver the same record on the next poll.
    Peek,
}

/// Write side of an append-only log.
pub trait LogAppender: Send {
    /// Append one encoded record, returning its position in the log.
    ///
    /// Returning successfully is the durability and ordering point.
    fn append(&mut self, record: &[u8]) -> ChronicleResult<u64>;
}

/// Read side of an append-only log.
pub trait LogPoller: Send {
    /// Offer at most one record to `handler`.
    ///
    /// Returns `1` if the handler consumed the record (`PollResult::Poll`), `0`
    /// if there was nothing to read or the handler peeked.
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]) -> PollResult) -> ChronicleResult<usize>;

    /// Position of the next record this poller will deliver.
    fn position(&self) -> u64;
}

impl<A> LogAppender for Box<A>
where
    A: LogAppender + ?Sized,
{
    fn append(&mut self, record: &[u8]) -> ChronicleResult<u64> {
        (**self).append(record)
    }
}

impl<P> LogPoller for Box<P>
where
    P: LogPoller + ?Sized,
{
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]) -> PollResult) -> ChronicleResult<usize> {
        (**self).poll(handler)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// Appender that captures records in memory, shared between clones.
///
/// Only built for tests and with the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct CapturingAppender {
    records: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl CapturingAppender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(any(test, feature = "test-util"))]
impl LogAppender for CapturingAppender {
    fn append(&mut self, record: &[u8]) -> ChronicleResult<u64> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| chronicle_core::ChronicleError::log("lock poisoned"))?;
        records.push(record.to_vec());
        Ok((records.len() - 1) as u64)
    }
}
