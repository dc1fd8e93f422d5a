//! Sending follow-up commands from event processing.
//!
//! [`CommandContext`] owns the command sources of one pipeline and the
//! transport sender they share. A command is built in a scoped
//! [`SendingContext`] and its source sequence is only consumed when the
//! transport accepts it, so a refused send never leaves a gap.
//!
//! The context also watches applied events of its own sources, which is what
//! `has_in_flight_command` is answered from. The last applied event of every
//! other source is remembered too, so a source registered later (for example
//! on its first send after a restart) continues after its history instead of
//! reusing sequences.

use std::collections::HashMap;

use chronicle_core::record::HEADER_LENGTH;
use chronicle_core::sequence::is_after;
use chronicle_core::{ChronicleError, ChronicleResult, RecordHeader, SourceId, TimeSource};
use tracing::{debug, trace};

use crate::source::{CommandSource, CommandSourceRegistry};
use crate::state::AppliedEvent;
use crate::transport::{MessageSender, SendingResult};

pub struct CommandContext {
    registry: CommandSourceRegistry,
    unregistered: HashMap<SourceId, AppliedEvent>,
    sender: Box<dyn MessageSender>,
    time_source: Box<dyn TimeSource>,
    buffer: Vec<u8>,
    max_payload_size: usize,
}

impl core::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandContext")
            .field("registry", &self.registry)
            .field("max_payload_size", &self.max_payload_size)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    pub fn new(
        sender: impl MessageSender + 'static,
        time_source: impl TimeSource + 'static,
        max_payload_size: usize,
    ) -> Self {
        Self {
            registry: CommandSourceRegistry::new(),
            unregistered: HashMap::new(),
            sender: Box::new(sender),
            time_source: Box::new(time_source),
            buffer: vec![0; HEADER_LENGTH + max_payload_size],
            max_payload_size,
        }
    }

    /// Register `source_id` as a source this context sends on.
    ///
    /// A source registered after events of it were applied continues after
    /// the last of them. Returns the source's registry index.
    pub fn register_source(&mut self, source_id: SourceId) -> ChronicleResult<usize> {
        if let Some(index) = self.registry.index_of(source_id) {
            return Ok(index);
        }
        let index = self.registry.register(source_id);
        if let Some(event) = self.unregistered.remove(&source_id) {
            let source = self
                .registry
                .at_mut(index)
                .ok_or_else(|| ChronicleError::illegal_state("registered source is missing"))?;
            source.on_event(event)?;
        }
        Ok(index)
    }

    pub fn source(&self, source_id: SourceId) -> Option<&CommandSource> {
        self.registry.get(source_id)
    }

    pub fn sources(&self) -> &CommandSourceRegistry {
        &self.registry
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// True if any source of this context has an in-flight command.
    pub fn has_in_flight_command(&self) -> bool {
        self.registry.has_in_flight_command()
    }

    /// True if `source_id` has a command whose terminal event was not yet applied.
    pub fn has_in_flight_command_for(&self, source_id: SourceId) -> bool {
        self.registry
            .get(source_id)
            .is_some_and(CommandSource::has_in_flight_command)
    }

    /// Open a scoped buffer for the next command of `source_id`.
    ///
    /// The source is registered on first use.
    pub fn sending_command(&mut self, source_id: SourceId, payload_type: i32) -> ChronicleResult<SendingContext<'_>> {
        let source_index = self.register_source(source_id)?;
        Ok(SendingContext {
            context: self,
            source_index,
            payload_type,
            closed: false,
        })
    }

    /// Send one command with a ready-made payload.
    pub fn send_command(
        &mut self,
        source_id: SourceId,
        payload_type: i32,
        payload: &[u8],
    ) -> ChronicleResult<SendingResult> {
        let mut context = self.sending_command(source_id, payload_type)?;
        let buffer = context.buffer();
        if payload.len() > buffer.len() {
            let capacity = buffer.len();
            context.abort();
            return Err(ChronicleError::out_of_bounds(0, payload.len(), capacity));
        }
        buffer[..payload.len()].copy_from_slice(payload);
        context.commit(payload.len())
    }

    /// Track an applied event.
    pub fn on_event(&mut self, header: &RecordHeader) -> ChronicleResult<()> {
        let Some(event) = AppliedEvent::from_header(header) else {
            return Err(ChronicleError::invalid_record("command record passed to command context"));
        };
        if let Some(source) = self.registry.get_mut(header.source_id) {
            return source.on_event(event);
        }
        let newer = self
            .unregistered
            .get(&header.source_id)
            .is_none_or(|last| !is_after(last.command_id.source_sequence, event.command_id.source_sequence));
        if newer {
            self.unregistered.insert(header.source_id, event);
        }
        Ok(())
    }

    fn commit_sending(&mut self, source_index: usize, payload_type: i32, length: usize) -> ChronicleResult<SendingResult> {
        if length > self.max_payload_size {
            return Err(ChronicleError::out_of_bounds(HEADER_LENGTH, length, self.buffer.len()));
        }
        let source = self
            .registry
            .at_mut(source_index)
            .ok_or_else(|| ChronicleError::illegal_state("sending context refers to an unknown source"))?;
        let header = RecordHeader::command(
            source.source_id(),
            source.next_sequence(),
            self.time_source.now(),
            payload_type,
            length as u32,
        );
        header.encode_into(&mut self.buffer, 0)?;

        let result = self.sender.send(&self.buffer[..header.record_length()]);
        if result.is_accepted() {
            source.mark_sent();
            trace!(
                source_id = %header.source_id,
                source_sequence = header.source_sequence,
                ?result,
                "command sent"
            );
        } else {
            debug!(
                source_id = %header.source_id,
                source_sequence = header.source_sequence,
                ?result,
                "command not accepted by transport"
            );
        }
        Ok(result)
    }
}

/// Scoped buffer for one command being sent.
///
/// Closed by exactly one of [`SendingContext::commit`] or
/// [`SendingContext::abort`]; dropping an open context aborts it.
pub struct SendingContext<'c> {
    context: &'c mut CommandContext,
    source_index: usize,
    payload_type: i32,
    closed: bool,
}

impl SendingContext<'_> {
    pub fn source_id(&self) -> Option<SourceId> {
        self.context.registry.source_id_at(self.source_index)
    }

    /// Sequence the command will carry if the transport accepts it.
    pub fn source_sequence(&self) -> Option<u64> {
        self.context
            .registry
            .at(self.source_index)
            .map(CommandSource::next_sequence)
    }

    pub fn payload_type(&self) -> i32 {
        self.payload_type
    }

    /// Payload area; its length is the context's maximum payload size.
    pub fn buffer(&mut self) -> &mut [u8] {
        &mut self.context.buffer[HEADER_LENGTH..]
    }

    /// Send the first `length` bytes of the buffer as the command payload.
    ///
    /// The source sequence advances only if the result is accepted.
    pub fn commit(mut self, length: usize) -> ChronicleResult<SendingResult> {
        self.closed = true;
        self.context.commit_sending(self.source_index, self.payload_type, length)
    }

    pub fn abort(mut self) {
        self.closed = true;
    }
}

impl Drop for SendingContext<'_> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(source_index = self.source_index, "sending context dropped without commit; aborted");
        }
    }
}
