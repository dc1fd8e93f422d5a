use std::sync::{Arc, RwLock};

use bytes::Bytes;
use chronicle_core::{ChronicleError, ChronicleResult, RecordView};
use chronicle_events::{LogAppender, LogPoller, PollResult};

/// In-memory append-only log of encoded records.
///
/// Clones share the same records. Any number of appenders and pollers may be
/// created; each poller keeps its own position.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    records: Arc<RwLock<Vec<Bytes>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `position`, if present.
    pub fn get(&self, position: u64) -> Option<Bytes> {
        let records = self.records.read().ok()?;
        usize::try_from(position)
            .ok()
            .and_then(|index| records.get(index).cloned())
    }

    /// Snapshot of every record appended so far.
    pub fn records(&self) -> Vec<Bytes> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn appender(&self) -> InMemoryAppender {
        InMemoryAppender { log: self.clone() }
    }

    /// Poller starting at the first record.
    pub fn poller(&self) -> InMemoryPoller {
        self.poller_from(0)
    }

    /// Poller starting at `position`.
    pub fn poller_from(&self, position: u64) -> InMemoryPoller {
        InMemoryPoller {
            log: self.clone(),
            position,
        }
    }
}

/// Write side of an [`InMemoryLog`].
///
/// Every appended record must be exactly one well-formed record.
#[derive(Debug, Clone)]
pub struct InMemoryAppender {
    log: InMemoryLog,
}

impl LogAppender for InMemoryAppender {
    fn append(&mut self, record: &[u8]) -> ChronicleResult<u64> {
        let view = RecordView::wrap(record, 0)?;
        if view.encoded_length() != record.len() {
            return Err(ChronicleError::invalid_record(format!(
                "appended {} bytes but record is {} bytes",
                record.len(),
                view.encoded_length()
            )));
        }

        let mut records = self
            .log
            .records
            .write()
            .map_err(|_| ChronicleError::log("lock poisoned"))?;
        records.push(Bytes::copy_from_slice(record));
        Ok((records.len() - 1) as u64)
    }
}

/// Read side of an [`InMemoryLog`] with its own position.
#[derive(Debug, Clone)]
pub struct InMemoryPoller {
    log: InMemoryLog,
    position: u64,
}

impl LogPoller for InMemoryPoller {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]) -> PollResult) -> ChronicleResult<usize> {
        let record = {
            let records = self
                .log
                .records
                .read()
                .map_err(|_| ChronicleError::log("lock poisoned"))?;
            match usize::try_from(self.position).ok().and_then(|index| records.get(index)) {
                Some(record) => record.clone(),
                None => return Ok(0),
            }
        };

        match handler(&record) {
            PollResult::Poll => {
                self.position += 1;
                Ok(1)
            }
            PollResult::Peek => Ok(0),
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}
