//! Dedup bookkeeping shared by the command and event handler chains.
//!
//! `BaseState` is owned by the pipeline and passed by `&mut` to the event
//! handler chain (the only writer) and by `&` to the command handler chain.
//! It tracks:
//!
//! - per source, the highest source sequence whose terminal event has been
//!   applied (the dedup watermark);
//! - per source, the last applied event of any type;
//! - globally, the last applied event sequence.

use std::collections::HashMap;

use chronicle_core::sequence::{is_after, is_at_or_before};
use chronicle_core::{ChronicleError, ChronicleResult, CommandId, EventType, NIL_SEQUENCE, RecordHeader, SourceId};

/// Summary of the last event applied for a source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AppliedEvent {
    pub command_id: CommandId,
    pub index: u16,
    pub event_sequence: u64,
    pub event_type: EventType,
}

impl AppliedEvent {
    /// Summary of an event header; `None` for command records.
    pub fn from_header(header: &RecordHeader) -> Option<Self> {
        header.event_type().map(|event_type| Self {
            command_id: header.command_id(),
            index: header.index,
            event_sequence: header.event_sequence,
            event_type,
        })
    }
}

#[derive(Debug, Copy, Clone)]
struct SourceProgress {
    last_fully_applied_sequence: u64,
    last_event: AppliedEvent,
}

#[derive(Debug, Clone)]
pub struct BaseState {
    sources: HashMap<SourceId, SourceProgress>,
    last_applied_event_sequence: u64,
}

impl Default for BaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseState {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            last_applied_event_sequence: NIL_SEQUENCE,
        }
    }

    /// Highest source sequence of `source_id` whose terminal event was applied; NIL if none.
    pub fn last_fully_applied_sequence(&self, source_id: SourceId) -> u64 {
        self.sources
            .get(&source_id)
            .map(|p| p.last_fully_applied_sequence)
            .unwrap_or(NIL_SEQUENCE)
    }

    /// True if every event of `command_id` was applied in this or a previous run.
    pub fn all_events_applied_for(&self, command_id: CommandId) -> bool {
        is_at_or_before(
            command_id.source_sequence,
            self.last_fully_applied_sequence(command_id.source_id),
        )
    }

    pub fn last_applied_event_sequence(&self) -> u64 {
        self.last_applied_event_sequence
    }

    /// True if the event with this sequence was already applied.
    pub fn event_applied(&self, event_sequence: u64) -> bool {
        is_at_or_before(event_sequence, self.last_applied_event_sequence)
    }

    pub fn last_applied_event(&self, source_id: SourceId) -> Option<AppliedEvent> {
        self.sources.get(&source_id).map(|p| p.last_event)
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.keys().copied()
    }

    /// Record that the event described by `header` was applied.
    ///
    /// Event sequences must be applied in strictly increasing order. The dedup
    /// watermark only moves on terminal events, so a crash between
    /// intermediary events and the terminal event reprocesses the whole command.
    pub fn apply_event(&mut self, header: &RecordHeader) -> ChronicleResult<()> {
        let last_event = AppliedEvent::from_header(header).ok_or_else(|| {
            ChronicleError::invalid_record("command record passed to event application")
        })?;
        if !is_after(header.event_sequence, self.last_applied_event_sequence) {
            return Err(ChronicleError::SequenceRetreat {
                current: self.last_applied_event_sequence,
                requested: header.event_sequence,
            });
        }

        let progress = self
            .sources
            .entry(header.source_id)
            .or_insert(SourceProgress {
                last_fully_applied_sequence: NIL_SEQUENCE,
                last_event,
            });
        progress.last_event = last_event;
        if last_event.event_type.is_terminal() && is_after(header.source_sequence, progress.last_fully_applied_sequence) {
            progress.last_fully_applied_sequence = header.source_sequence;
        }
        self.last_applied_event_sequence = header.event_sequence;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(source: i32, sequence: u64, index: u16, event_sequence: u64, event_type: EventType) -> RecordHeader {
        RecordHeader::event(
            CommandId::new(SourceId::new(source), sequence),
            index,
            event_sequence,
            event_type,
            0,
            1,
            0,
        )
    }

    #[test]
    fn intermediary_events_do_not_move_the_watermark() {
        let mut state = BaseState::new();
        let source = SourceId::new(7);
        state.apply_event(&event(7, 3, 0, 0, EventType::Intermediary)).unwrap();

        assert_eq!(state.last_fully_applied_sequence(source), NIL_SEQUENCE);
        assert!(!state.all_events_applied_for(CommandId::new(source, 3)));
        assert_eq!(state.last_applied_event_sequence(), 0);

        state.apply_event(&event(7, 3, 1, 1, EventType::Commit)).unwrap();
        assert_eq!(state.last_fully_applied_sequence(source), 3);
        assert!(state.all_events_applied_for(CommandId::new(source, 2)));
        assert!(state.all_events_applied_for(CommandId::new(source, 3)));
        assert!(!state.all_events_applied_for(CommandId::new(source, 4)));
        assert_eq!(
            state.last_applied_event(source).map(|e| e.event_type),
            Some(EventType::Commit)
        );
    }

    #[test]
    fn rollback_and_auto_commit_are_terminal() {
        let mut state = BaseState::new();
        state.apply_event(&event(1, 0, 0, 0, EventType::AutoCommit)).unwrap();
        state.apply_event(&event(2, 5, 0, 1, EventType::Rollback)).unwrap();
        assert_eq!(state.last_fully_applied_sequence(SourceId::new(1)), 0);
        assert_eq!(state.last_fully_applied_sequence(SourceId::new(2)), 5);
    }

    #[test]
    fn event_sequences_must_increase() {
        let mut state = BaseState::new();
        state.apply_event(&event(1, 0, 0, 4, EventType::AutoCommit)).unwrap();
        assert!(state.event_applied(4));
        assert!(state.event_applied(2));
        assert!(!state.event_applied(5));
        assert!(matches!(
            state.apply_event(&event(1, 1, 0, 4, EventType::AutoCommit)),
            Err(ChronicleError::SequenceRetreat { .. })
        ));
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let mut state = BaseState::new();
        state.apply_event(&event(1, 9, 0, 0, EventType::Commit)).unwrap();
        state.apply_event(&event(1, 4, 0, 1, EventType::Commit)).unwrap();
        assert_eq!(state.last_fully_applied_sequence(SourceId::new(1)), 9);
    }

    #[test]
    fn command_records_are_rejected() {
        let mut state = BaseState::new();
        let command = RecordHeader::command(SourceId::new(1), 0, 0, 0, 0);
        assert!(matches!(state.apply_event(&command), Err(ChronicleError::InvalidRecord(_))));
    }
}
