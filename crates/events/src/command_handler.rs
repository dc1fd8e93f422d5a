//! Command handler chain.
//!
//! Each command polled from the command log ends in one of three outcomes:
//!
//! - **Skipped** (POLL): every event of the command was applied before, so it
//!   is a duplicate. No events are routed.
//! - **Committed** (POLL): the processor ran and the router finalized the
//!   command with a terminal event.
//! - **Deferred** (PEEK): the handler is paused, the event handler chain has
//!   not yet applied everything the router appended, or the command was rolled
//!   back for replay. The same record is offered again on the next poll.

use std::sync::Arc;

use chronicle_core::sequence::is_after;
use chronicle_core::{ChronicleError, ChronicleResult, CommandId, RecordKind, RecordView};
use tracing::{debug, trace};

use crate::handler::{DuplicateHandler, ExceptionHandler};
use crate::log::PollResult;
use crate::router::EventRouter;
use crate::state::BaseState;

/// Application logic turning one command into events.
///
/// Implementations must be deterministic: the same command against the same
/// state must route the same events.
pub trait CommandProcessor: Send {
    fn on_command(&mut self, command: &RecordView<'_>, router: &mut EventRouter) -> anyhow::Result<()>;
}

impl<F> CommandProcessor for F
where
    F: FnMut(&RecordView<'_>, &mut EventRouter) -> anyhow::Result<()> + Send,
{
    fn on_command(&mut self, command: &RecordView<'_>, router: &mut EventRouter) -> anyhow::Result<()> {
        self(command, router)
    }
}

pub struct CommandHandler<P> {
    processor: P,
    router: EventRouter,
    duplicates: Arc<dyn DuplicateHandler>,
    exceptions: Arc<dyn ExceptionHandler>,
    paused: bool,
    replay_pending: Option<CommandId>,
}

impl<P> CommandHandler<P>
where
    P: CommandProcessor,
{
    pub fn new(
        processor: P,
        router: EventRouter,
        duplicates: Arc<dyn DuplicateHandler>,
        exceptions: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            processor,
            router,
            duplicates,
            exceptions,
            paused: false,
            replay_pending: None,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut EventRouter {
        &mut self.router
    }

    /// Stop processing; polled commands are peeked until `resume()`.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Command that was rolled back for replay and will be processed again.
    pub fn replay_pending(&self) -> Option<CommandId> {
        self.replay_pending
    }

    /// Handle one encoded command record.
    ///
    /// Errors are protocol or log failures and must stop the pipeline; the
    /// record is then left unconsumed.
    /// Undecodable records and processor failures are reported to the
    /// exception handler and consumed.
    pub fn on_command(&mut self, record: &[u8], state: &BaseState) -> ChronicleResult<PollResult> {
        let (command, command_id) = match decode_command(record) {
            Ok(decoded) => decoded,
            Err(error) => {
                self.exceptions.handle_record_exception(record, &error);
                return Ok(PollResult::Poll);
            }
        };

        if self.paused {
            trace!(command = %command_id, "command handler paused");
            return Ok(PollResult::Peek);
        }
        if is_after(self.router.last_appended_event_sequence(), state.last_applied_event_sequence()) {
            trace!(
                command = %command_id,
                appended = self.router.last_appended_event_sequence(),
                applied = state.last_applied_event_sequence(),
                "waiting for event handler to catch up"
            );
            return Ok(PollResult::Peek);
        }

        let replaying = self.replay_pending.take() == Some(command_id);
        if !replaying && state.all_events_applied_for(command_id) {
            self.duplicates.skip_command_processing(&command);
            return Ok(PollResult::Poll);
        }

        self.router.start(&command)?;
        if let Err(error) = self.processor.on_command(&command, &mut self.router) {
            // A log failure is returned by `complete()` below.
            if !self.router.has_append_failure() {
                self.exceptions.handle_command_processor_exception(&command, &error);
            }
        }
        if self.router.complete()? {
            Ok(PollResult::Poll)
        } else {
            debug!(command = %command_id, "command rolled back; replaying");
            self.replay_pending = Some(command_id);
            Ok(PollResult::Peek)
        }
    }
}

fn decode_command<'a>(record: &'a [u8]) -> ChronicleResult<(RecordView<'a>, CommandId)> {
    let view = RecordView::wrap(record, 0)?;
    if view.kind()? != RecordKind::Command {
        return Err(ChronicleError::invalid_record("event record found in command log"));
    }
    let command_id = view.command_id()?;
    Ok((view, command_id))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chronicle_core::{EventType, RecordHeader, SourceId};

    use super::*;
    use crate::handler::recording::{Observed, RecordingHandler};
    use crate::log::CapturingAppender;
    use crate::router::RollbackMode;

    fn command(source: i32, sequence: u64) -> Vec<u8> {
        RecordHeader::command(SourceId::new(source), sequence, 1, 7, 3)
            .to_record_bytes(b"cmd")
            .unwrap()
    }

    fn handler<P: CommandProcessor>(processor: P) -> (CommandHandler<P>, CapturingAppender, Arc<RecordingHandler>) {
        let appender = CapturingAppender::new();
        let recorder = RecordingHandler::new();
        let router = EventRouter::new(appender.clone(), || 9i64, 128);
        let handler = CommandHandler::new(processor, router, recorder.clone(), recorder.clone());
        (handler, appender, recorder)
    }

    fn apply_all(appender: &CapturingAppender, state: &mut BaseState) {
        for record in appender.records() {
            let header = RecordView::wrap(&record, 0).unwrap().header().unwrap();
            if !state.event_applied(header.event_sequence) {
                state.apply_event(&header).unwrap();
            }
        }
    }

    fn processor<F>(f: F) -> F
    where
        F: FnMut(&RecordView<'_>, &mut EventRouter) -> anyhow::Result<()> + Send,
    {
        f
    }

    fn one_event(_: &RecordView<'_>, router: &mut EventRouter) -> anyhow::Result<()> {
        router.route_event(1, b"evt")?;
        Ok(())
    }

    #[test]
    fn duplicate_command_routes_nothing_twice() {
        let (mut handler, appender, recorder) = handler(one_event);
        let mut state = BaseState::new();

        assert_eq!(handler.on_command(&command(4, 0), &state).unwrap(), PollResult::Poll);
        apply_all(&appender, &mut state);
        assert_eq!(appender.len(), 1);

        for _ in 0..2 {
            assert_eq!(handler.on_command(&command(4, 0), &state).unwrap(), PollResult::Poll);
        }
        assert_eq!(appender.len(), 1);
        assert_eq!(
            recorder.observed(),
            vec![
                Observed::SkippedCommand { source_sequence: 0 },
                Observed::SkippedCommand { source_sequence: 0 },
            ]
        );
    }

    #[test]
    fn processor_failure_is_reported_and_command_still_completes() {
        let (mut handler, appender, recorder) = handler(processor(|_, _| Err(anyhow::anyhow!("boom"))));
        let state = BaseState::new();

        assert_eq!(handler.on_command(&command(1, 5), &state).unwrap(), PollResult::Poll);

        let records = appender.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            RecordView::wrap(&records[0], 0).unwrap().event_type().unwrap(),
            EventType::AutoCommit
        );
        assert_eq!(
            recorder.observed(),
            vec![Observed::CommandProcessorFailed {
                source_sequence: 5,
                message: "boom".to_string()
            }]
        );
    }

    struct BrokenLog;

    impl crate::log::LogAppender for BrokenLog {
        fn append(&mut self, _record: &[u8]) -> ChronicleResult<u64> {
            Err(ChronicleError::log("disk full"))
        }
    }

    #[test]
    fn event_log_failure_stops_instead_of_committing() {
        let recorder = RecordingHandler::new();
        let router = EventRouter::new(BrokenLog, || 0i64, 128);
        let two_events = processor(|_, router| {
            router.route_event(1, b"a")?;
            router.route_event(1, b"b")?;
            Ok(())
        });
        let mut handler = CommandHandler::new(two_events, router, recorder.clone(), recorder.clone());

        assert_eq!(
            handler.on_command(&command(1, 0), &BaseState::new()),
            Err(ChronicleError::log("disk full"))
        );
        assert!(recorder.observed().is_empty());
        assert_eq!(handler.router().next_event_sequence(), 0);
        assert_eq!(handler.router().state(), crate::router::RouterState::Idle);
    }

    #[test]
    fn paused_handler_peeks_without_routing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let (mut handler, appender, _) = handler(processor(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let state = BaseState::new();

        handler.pause();
        assert!(handler.is_paused());
        assert_eq!(handler.on_command(&command(1, 0), &state).unwrap(), PollResult::Peek);
        assert!(appender.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handler.resume();
        assert!(!handler.is_paused());
        assert_eq!(handler.on_command(&command(1, 0), &state).unwrap(), PollResult::Poll);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waits_until_routed_events_are_applied() {
        let (mut handler, appender, _) = handler(one_event);
        let mut state = BaseState::new();

        assert_eq!(handler.on_command(&command(1, 0), &state).unwrap(), PollResult::Poll);
        assert_eq!(handler.on_command(&command(1, 1), &state).unwrap(), PollResult::Peek);

        apply_all(&appender, &mut state);
        assert_eq!(handler.on_command(&command(1, 1), &state).unwrap(), PollResult::Poll);
        assert_eq!(appender.len(), 2);
    }

    #[test]
    fn replay_rollback_reprocesses_the_command_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();
        let (mut handler, appender, recorder) = handler(processor(move |_, router| {
            router.route_event(1, b"try")?;
            if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                router.rollback(RollbackMode::ReplayCommand)?;
            }
            Ok(())
        }));
        let mut state = BaseState::new();

        assert_eq!(handler.on_command(&command(2, 0), &state).unwrap(), PollResult::Peek);
        assert_eq!(handler.replay_pending(), Some(CommandId::new(SourceId::new(2), 0)));
        assert_eq!(handler.on_command(&command(2, 0), &state).unwrap(), PollResult::Peek);

        apply_all(&appender, &mut state);
        assert!(state.all_events_applied_for(CommandId::new(SourceId::new(2), 0)));
        assert_eq!(handler.on_command(&command(2, 0), &state).unwrap(), PollResult::Poll);
        apply_all(&appender, &mut state);

        let types: Vec<_> = appender
            .records()
            .iter()
            .map(|r| RecordView::wrap(r, 0).unwrap().event_type().unwrap())
            .collect();
        assert_eq!(
            types,
            vec![EventType::Intermediary, EventType::Rollback, EventType::Commit]
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(recorder.observed().is_empty());

        assert_eq!(handler.on_command(&command(2, 0), &state).unwrap(), PollResult::Poll);
        assert_eq!(appender.len(), 3);
    }

    #[test]
    fn undecodable_and_event_records_are_rejected() {
        let (mut handler, appender, recorder) = handler(one_event);
        let state = BaseState::new();

        assert_eq!(handler.on_command(&[1, 2, 3], &state).unwrap(), PollResult::Poll);
        let event = RecordHeader::event(
            CommandId::new(SourceId::new(1), 0),
            0,
            0,
            EventType::Commit,
            0,
            0,
            0,
        )
        .to_record_bytes(&[])
        .unwrap();
        assert_eq!(handler.on_command(&event, &state).unwrap(), PollResult::Poll);

        assert!(appender.is_empty());
        let observed = recorder.observed();
        assert_eq!(observed.len(), 2);
        assert!(matches!(
            observed[1],
            Observed::RecordRejected {
                error: ChronicleError::InvalidRecord(_)
            }
        ));
    }
}
