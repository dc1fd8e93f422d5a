//! Event routing for one command at a time.
//!
//! The router is the only place that assigns event indices and global event
//! sequences. Its lifecycle per command is:
//!
//! ```text
//! Idle --start()--> Started --routing_event()/route_event()*--> Started --complete()--> Idle
//! ```
//!
//! ## Commit marking
//!
//! Every routed event is first written as INTERMEDIARY. The most recently
//! routed event is held back in a staging slot until either another event is
//! routed (the staged one is appended unchanged) or `complete()` decides the
//! command's fate, at which point its type byte is rewritten in place to
//! COMMIT before the append. This is what guarantees exactly one terminal event
//! per command, always at the highest index.
//!
//! ## Scoped routing
//!
//! [`EventRouter::routing_event`] hands out a [`RoutingContext`] borrowing the
//! router mutably, so a second context cannot be opened while one is live. The
//! context must be closed with `commit(length)` or `abort()`; dropping it
//! without either aborts. An aborted route leaves its index and sequence
//! unused for the next route.
//!
//! ## Append failures
//!
//! A staged event leaves the staging slot only once the log accepted it. After
//! a failed append the router refuses further routing, `complete()` returns the
//! log error instead of a terminal event, and the event sequence is rewound to
//! the first sequence that was never appended.

use chronicle_core::record::{HEADER_LENGTH, SYSTEM_PAYLOAD_TYPE};
use chronicle_core::sequence::{is_after, successor};
use chronicle_core::{
    ChronicleError, ChronicleResult, CommandId, EventType, NIL_SEQUENCE, RecordHeader, RecordKind, RecordView,
    RecordViewMut, SourceId, TimeSource,
};
use tracing::{debug, trace, warn};

use crate::log::LogAppender;

/// What `complete()` does when the processor requested a rollback.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RollbackMode {
    /// Close the command with a ROLLBACK event; nothing is redone.
    SkipCommand,
    /// Close the command with a ROLLBACK event and report failure so the
    /// command is processed again from scratch.
    ReplayCommand,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RouterState {
    Idle,
    Started,
}

pub struct EventRouter {
    appender: Box<dyn LogAppender>,
    time_source: Box<dyn TimeSource>,
    max_payload_size: usize,
    scratch: Vec<u8>,
    staging: Vec<u8>,
    staged: Option<RecordHeader>,
    state: RouterState,
    command_id: CommandId,
    event_time: i64,
    next_index: u32,
    next_event_sequence: u64,
    last_appended_event_sequence: u64,
    /// First event sequence not yet accepted by the log.
    unappended_event_sequence: u64,
    append_failure: Option<ChronicleError>,
    skipped: bool,
    rollback: Option<RollbackMode>,
}

impl core::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventRouter")
            .field("state", &self.state)
            .field("command_id", &self.command_id)
            .field("next_index", &self.next_index)
            .field("next_event_sequence", &self.next_event_sequence)
            .field("skipped", &self.skipped)
            .field("rollback", &self.rollback)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    pub fn new(
        appender: impl LogAppender + 'static,
        time_source: impl TimeSource + 'static,
        max_payload_size: usize,
    ) -> Self {
        Self {
            appender: Box::new(appender),
            time_source: Box::new(time_source),
            max_payload_size,
            scratch: vec![0; HEADER_LENGTH + max_payload_size],
            staging: vec![0; HEADER_LENGTH + max_payload_size],
            staged: None,
            state: RouterState::Idle,
            command_id: CommandId::new(SourceId::new(0), NIL_SEQUENCE),
            event_time: 0,
            next_index: 0,
            next_event_sequence: successor(NIL_SEQUENCE),
            last_appended_event_sequence: NIL_SEQUENCE,
            unappended_event_sequence: successor(NIL_SEQUENCE),
            append_failure: None,
            skipped: false,
            rollback: None,
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Command currently being routed (NIL sequence when idle).
    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Time stamped on every event of the current command, captured at `start()`.
    pub fn event_time(&self) -> i64 {
        self.event_time
    }

    /// Index the next routed event of the current command will get.
    pub fn next_event_index(&self) -> u32 {
        self.next_index
    }

    /// Global sequence the next routed event will get.
    pub fn next_event_sequence(&self) -> u64 {
        self.next_event_sequence
    }

    /// Sequence of the last event actually appended to the log; NIL if none.
    pub fn last_appended_event_sequence(&self) -> u64 {
        self.last_appended_event_sequence
    }

    /// True when an append of the current command failed.
    pub fn has_append_failure(&self) -> bool {
        self.append_failure.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Continue global event sequencing after `last_applied_event_sequence`.
    ///
    /// Used after replay. Fails if events beyond that point were already routed
    /// by this router.
    pub fn resume_after(&mut self, last_applied_event_sequence: u64) -> ChronicleResult<()> {
        self.ensure_state(RouterState::Idle, "resume event sequencing")?;
        let next = successor(last_applied_event_sequence);
        if is_after(self.next_event_sequence, next) {
            return Err(ChronicleError::SequenceRetreat {
                current: self.next_event_sequence,
                requested: next,
            });
        }
        self.next_event_sequence = next;
        self.unappended_event_sequence = next;
        Ok(())
    }

    /// Begin routing events for `command`.
    pub fn start(&mut self, command: &RecordView<'_>) -> ChronicleResult<()> {
        self.ensure_state(RouterState::Idle, "start a command")?;
        if command.kind()? != RecordKind::Command {
            return Err(ChronicleError::invalid_record("router can only start on a command record"));
        }
        self.command_id = command.command_id()?;
        self.event_time = self.time_source.now();
        self.next_index = 0;
        self.staged = None;
        self.skipped = false;
        self.rollback = None;
        self.state = RouterState::Started;
        trace!(command = %self.command_id, "router started");
        Ok(())
    }

    /// Open a scoped buffer for the next event of the current command.
    pub fn routing_event(&mut self, payload_type: i32) -> ChronicleResult<RoutingContext<'_>> {
        self.ensure_state(RouterState::Started, "route an event")?;
        if self.skipped {
            return Err(ChronicleError::illegal_state("cannot route an event for a skipped command"));
        }
        if self.rollback.is_some() {
            return Err(ChronicleError::illegal_state(
                "cannot route an event after a rollback was requested",
            ));
        }
        if let Some(error) = &self.append_failure {
            return Err(error.clone());
        }
        // The last index is kept for the terminal event.
        if self.next_index >= u32::from(u16::MAX) {
            return Err(ChronicleError::illegal_state("event index space of the command is exhausted"));
        }
        Ok(RoutingContext {
            router: self,
            payload_type,
            closed: false,
        })
    }

    /// Route one event with a ready-made payload.
    pub fn route_event(&mut self, payload_type: i32, payload: &[u8]) -> ChronicleResult<()> {
        let mut context = self.routing_event(payload_type)?;
        let buffer = context.buffer();
        if payload.len() > buffer.len() {
            let capacity = buffer.len();
            context.abort();
            return Err(ChronicleError::out_of_bounds(0, payload.len(), capacity));
        }
        buffer[..payload.len()].copy_from_slice(payload);
        context.commit(payload.len())
    }

    /// Suppress the current command: no events, no commit marker.
    ///
    /// Returns `false` without side effects if an event was already routed or a
    /// rollback was requested.
    pub fn skip_command(&mut self) -> ChronicleResult<bool> {
        self.ensure_state(RouterState::Started, "skip a command")?;
        if self.next_index > 0 || self.rollback.is_some() {
            debug!(
                command = %self.command_id,
                routed = self.next_index,
                "skip rejected: command already produced events"
            );
            return Ok(false);
        }
        self.skipped = true;
        Ok(true)
    }

    /// Request that the current command be closed with a ROLLBACK event.
    pub fn rollback(&mut self, mode: RollbackMode) -> ChronicleResult<()> {
        self.ensure_state(RouterState::Started, "roll back a command")?;
        if self.skipped {
            return Err(ChronicleError::illegal_state("cannot roll back a skipped command"));
        }
        if let Some(existing) = self.rollback {
            return Err(ChronicleError::illegal_state(format!(
                "rollback already requested ({existing:?})"
            )));
        }
        self.rollback = Some(mode);
        Ok(())
    }

    /// Finalize the current command and return to idle.
    ///
    /// Returns `false` only for a `ReplayCommand` rollback: the command's
    /// effects were not committed and it must be processed again. Returns the
    /// log error if any append of this command failed; the command then has no
    /// terminal event and must not be considered handled.
    pub fn complete(&mut self) -> ChronicleResult<bool> {
        self.ensure_state(RouterState::Started, "complete a command")?;
        let outcome = match self.append_failure.take() {
            Some(error) => Err(error),
            None => self.finalize(),
        };
        if outcome.is_err() {
            self.next_event_sequence = self.unappended_event_sequence;
            self.append_failure = None;
        }
        debug!(
            command = %self.command_id,
            events = self.next_index,
            skipped = self.skipped,
            rollback = ?self.rollback,
            outcome = ?outcome,
            "command completed"
        );
        self.state = RouterState::Idle;
        self.staged = None;
        self.skipped = false;
        self.rollback = None;
        self.next_index = 0;
        outcome
    }

    fn finalize(&mut self) -> ChronicleResult<bool> {
        if self.skipped {
            return Ok(true);
        }
        match self.rollback {
            Some(mode) => {
                self.flush_staged()?;
                self.append_system_event(EventType::Rollback)?;
                Ok(mode == RollbackMode::SkipCommand)
            }
            None if self.staged.is_none() => {
                self.append_system_event(EventType::AutoCommit)?;
                Ok(true)
            }
            None => {
                RecordViewMut::wrap(&mut self.staging, 0)?.set_event_type(EventType::Commit)?;
                self.flush_staged()?;
                Ok(true)
            }
        }
    }

    fn commit_routed(&mut self, payload_type: i32, length: usize) -> ChronicleResult<()> {
        if length > self.max_payload_size {
            return Err(ChronicleError::out_of_bounds(HEADER_LENGTH, length, self.scratch.len()));
        }
        let header = RecordHeader::event(
            self.command_id,
            self.current_index()?,
            self.next_event_sequence,
            EventType::Intermediary,
            self.event_time,
            payload_type,
            u32::try_from(length).map_err(|_| ChronicleError::out_of_bounds(HEADER_LENGTH, length, self.scratch.len()))?,
        );
        header.encode_into(&mut self.scratch, 0)?;
        self.flush_staged()?;

        core::mem::swap(&mut self.scratch, &mut self.staging);
        self.staged = Some(header);
        self.next_index += 1;
        self.next_event_sequence = successor(self.next_event_sequence);
        trace!(
            command = %self.command_id,
            index = header.index,
            event_sequence = header.event_sequence,
            "event routed"
        );
        Ok(())
    }

    fn flush_staged(&mut self) -> ChronicleResult<()> {
        if let Some(header) = self.staged {
            if let Err(error) = self.appender.append(&self.staging[..header.record_length()]) {
                return Err(self.append_failed(error));
            }
            self.staged = None;
            self.appended(header.event_sequence);
        }
        Ok(())
    }

    fn append_system_event(&mut self, event_type: EventType) -> ChronicleResult<()> {
        let header = RecordHeader::event(
            self.command_id,
            self.current_index()?,
            self.next_event_sequence,
            event_type,
            self.event_time,
            SYSTEM_PAYLOAD_TYPE,
            0,
        );
        header.encode_into(&mut self.scratch, 0)?;
        if let Err(error) = self.appender.append(&self.scratch[..HEADER_LENGTH]) {
            return Err(self.append_failed(error));
        }
        self.appended(header.event_sequence);
        self.next_index += 1;
        self.next_event_sequence = successor(self.next_event_sequence);
        Ok(())
    }

    fn appended(&mut self, event_sequence: u64) {
        self.last_appended_event_sequence = event_sequence;
        self.unappended_event_sequence = successor(event_sequence);
    }

    fn append_failed(&mut self, error: ChronicleError) -> ChronicleError {
        warn!(
            command = %self.command_id,
            event_sequence = self.unappended_event_sequence,
            error = %error,
            "event append failed"
        );
        self.append_failure = Some(error.clone());
        error
    }

    fn current_index(&self) -> ChronicleResult<u16> {
        u16::try_from(self.next_index)
            .map_err(|_| ChronicleError::illegal_state("event index space of the command is exhausted"))
    }

    fn ensure_state(&self, expected: RouterState, action: &str) -> ChronicleResult<()> {
        if self.state != expected {
            return Err(ChronicleError::illegal_state(format!(
                "cannot {action} while router is {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

/// Scoped buffer for one event being routed.
///
/// Closed by exactly one of [`RoutingContext::commit`] or
/// [`RoutingContext::abort`]; dropping an open context aborts it.
pub struct RoutingContext<'r> {
    router: &'r mut EventRouter,
    payload_type: i32,
    closed: bool,
}

impl RoutingContext<'_> {
    /// Index this event will get if committed.
    pub fn index(&self) -> u16 {
        self.router.current_index().unwrap_or(u16::MAX)
    }

    /// Global sequence this event will get if committed.
    pub fn event_sequence(&self) -> u64 {
        self.router.next_event_sequence
    }

    pub fn payload_type(&self) -> i32 {
        self.payload_type
    }

    /// Payload area; its length is the router's maximum payload size.
    pub fn buffer(&mut self) -> &mut [u8] {
        &mut self.router.scratch[HEADER_LENGTH..]
    }

    /// Publish the first `length` bytes of the buffer as the event payload.
    pub fn commit(mut self, length: usize) -> ChronicleResult<()> {
        self.closed = true;
        self.router.commit_routed(self.payload_type, length)
    }

    /// Discard the event; its index and sequence stay unused.
    pub fn abort(mut self) {
        self.closed = true;
        trace!(command = %self.router.command_id, "event route aborted");
    }
}

impl Drop for RoutingContext<'_> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(
                command = %self.router.command_id,
                index = self.router.next_index,
                "routing context dropped without commit; aborted"
            );
        }
    }
}
