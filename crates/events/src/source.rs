//! Command sources and their registry.
//!
//! A source is a logical origin of commands with its own monotonic sequence.
//! The registry maps source ids to dense indices in both directions; entries
//! are created on first use and never removed.

use std::collections::HashMap;

use chronicle_core::sequence::is_after;
use chronicle_core::{ChronicleResult, NIL_SEQUENCE, SequenceGenerator, SourceId};
use tracing::debug;

use crate::state::AppliedEvent;

#[derive(Debug, Clone)]
pub struct CommandSource {
    source_id: SourceId,
    generator: SequenceGenerator,
    last_event: Option<AppliedEvent>,
}

impl CommandSource {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            generator: SequenceGenerator::new(),
            last_event: None,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Sequence of the last command accepted by the transport; NIL if none.
    pub fn last_sent_sequence(&self) -> u64 {
        self.generator.current()
    }

    /// Sequence the next command from this source will carry.
    pub fn next_sequence(&self) -> u64 {
        self.generator.peek_next()
    }

    /// Last applied event that originated from this source.
    pub fn last_event(&self) -> Option<AppliedEvent> {
        self.last_event
    }

    /// True while the last sent command's terminal event has not been applied.
    pub fn has_in_flight_command(&self) -> bool {
        let sent = self.generator.current();
        if sent == NIL_SEQUENCE {
            return false;
        }
        match self.last_event {
            None => true,
            Some(event) => {
                let applied = event.command_id.source_sequence;
                is_after(sent, applied) || (sent == applied && !event.event_type.is_terminal())
            }
        }
    }

    pub(crate) fn mark_sent(&mut self) -> u64 {
        self.generator.next()
    }

    /// Track an applied event of this source.
    ///
    /// An event for a command beyond the generator (sent by an earlier run)
    /// fast-forwards the generator so its sequence is never reused. Events of
    /// commands older than the last tracked one are ignored.
    pub fn on_event(&mut self, event: AppliedEvent) -> ChronicleResult<()> {
        let sequence = event.command_id.source_sequence;
        if let Some(last) = self.last_event {
            if is_after(last.command_id.source_sequence, sequence) {
                return Ok(());
            }
        }
        if is_after(sequence, self.generator.current()) {
            debug!(
                source_id = %self.source_id,
                from = self.generator.current(),
                to = sequence,
                "fast-forwarding source sequence"
            );
            self.generator.fast_forward(sequence)?;
        }
        self.last_event = Some(event);
        Ok(())
    }
}

/// Bidirectional `SourceId` <-> index registry.
#[derive(Debug, Clone, Default)]
pub struct CommandSourceRegistry {
    sources: Vec<CommandSource>,
    indices: HashMap<SourceId, usize>,
}

impl CommandSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Index of `source_id`, registering the source if it is new.
    pub fn register(&mut self, source_id: SourceId) -> usize {
        if let Some(&index) = self.indices.get(&source_id) {
            return index;
        }
        let index = self.sources.len();
        self.sources.push(CommandSource::new(source_id));
        self.indices.insert(source_id, index);
        debug!(source_id = %source_id, index, "command source registered");
        index
    }

    pub fn index_of(&self, source_id: SourceId) -> Option<usize> {
        self.indices.get(&source_id).copied()
    }

    pub fn source_id_at(&self, index: usize) -> Option<SourceId> {
        self.sources.get(index).map(CommandSource::source_id)
    }

    pub fn get(&self, source_id: SourceId) -> Option<&CommandSource> {
        self.index_of(source_id).and_then(|index| self.sources.get(index))
    }

    pub fn get_mut(&mut self, source_id: SourceId) -> Option<&mut CommandSource> {
        self.index_of(source_id).and_then(|index| self.sources.get_mut(index))
    }

    pub fn at(&self, index: usize) -> Option<&CommandSource> {
        self.sources.get(index)
    }

    pub(crate) fn at_mut(&mut self, index: usize) -> Option<&mut CommandSource> {
        self.sources.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSource> {
        self.sources.iter()
    }

    /// True if any registered source has an in-flight command.
    pub fn has_in_flight_command(&self) -> bool {
        self.sources.iter().any(CommandSource::has_in_flight_command)
    }
}

#[cfg(test)]
mod tests {
    use chronicle_core::{CommandId, EventType};

    use super::*;

    fn applied(source: i32, sequence: u64, event_type: EventType) -> AppliedEvent {
        AppliedEvent {
            command_id: CommandId::new(SourceId::new(source), sequence),
            index: 0,
            event_sequence: 0,
            event_type,
        }
    }

    #[test]
    fn registry_maps_both_directions_and_never_duplicates() {
        let mut registry = CommandSourceRegistry::new();
        assert_eq!(registry.register(SourceId::new(42)), 0);
        assert_eq!(registry.register(SourceId::new(-3)), 1);
        assert_eq!(registry.register(SourceId::new(42)), 0);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_of(SourceId::new(-3)), Some(1));
        assert_eq!(registry.source_id_at(0), Some(SourceId::new(42)));
        assert_eq!(registry.source_id_at(2), None);
        assert!(registry.get(SourceId::new(7)).is_none());
    }

    #[test]
    fn in_flight_until_terminal_event_applied() {
        let mut source = CommandSource::new(SourceId::new(1));
        assert!(!source.has_in_flight_command());

        assert_eq!(source.mark_sent(), 0);
        assert!(source.has_in_flight_command());

        source.on_event(applied(1, 0, EventType::Intermediary)).unwrap();
        assert!(source.has_in_flight_command());

        source.on_event(applied(1, 0, EventType::Commit)).unwrap();
        assert!(!source.has_in_flight_command());

        source.mark_sent();
        assert!(source.has_in_flight_command());
    }

    #[test]
    fn events_from_an_earlier_run_fast_forward_the_generator() {
        let mut source = CommandSource::new(SourceId::new(1));
        source.on_event(applied(1, 6, EventType::AutoCommit)).unwrap();

        assert_eq!(source.last_sent_sequence(), 6);
        assert_eq!(source.next_sequence(), 7);
        assert!(!source.has_in_flight_command());

        source.on_event(applied(1, 2, EventType::Intermediary)).unwrap();
        assert_eq!(source.last_sent_sequence(), 6);
        assert_eq!(source.last_event().map(|e| e.command_id.source_sequence), Some(6));
        assert!(!source.has_in_flight_command());
    }

    #[test]
    fn registry_reports_any_in_flight_source() {
        let mut registry = CommandSourceRegistry::new();
        let quiet = registry.register(SourceId::new(1));
        let busy = registry.register(SourceId::new(2));
        assert!(!registry.has_in_flight_command());

        registry.at_mut(busy).unwrap().mark_sent();
        assert!(registry.has_in_flight_command());
        assert!(!registry.at(quiet).unwrap().has_in_flight_command());
    }
}
