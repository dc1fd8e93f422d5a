//! Event processors: application logic reacting to applied events by sending
//! follow-up commands.
//!
//! A processor that depends on the outcome of its own earlier commands should
//! return [`ProcessingDecision::Deferred`] while
//! [`CommandContext::has_in_flight_command_for`] is true for its source. The
//! event is then peeked and offered again once the in-flight command has
//! round-tripped, which keeps causal order per source without stalling others.

use std::sync::Arc;

use chronicle_core::sequence::is_at_or_before;
use chronicle_core::{ChronicleResult, NIL_SEQUENCE, RecordKind, RecordView};
use tracing::trace;

use crate::context::CommandContext;
use crate::handler::ExceptionHandler;
use crate::log::PollResult;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessingDecision {
    Processed,
    /// Not processed yet; offer the same event again later.
    Deferred,
}

pub trait EventProcessor: Send {
    fn on_event(&mut self, event: &RecordView<'_>, context: &mut CommandContext) -> anyhow::Result<ProcessingDecision>;
}

impl<F> EventProcessor for F
where
    F: FnMut(&RecordView<'_>, &mut CommandContext) -> anyhow::Result<ProcessingDecision> + Send,
{
    fn on_event(&mut self, event: &RecordView<'_>, context: &mut CommandContext) -> anyhow::Result<ProcessingDecision> {
        self(event, context)
    }
}

/// Drives one [`EventProcessor`] from an event log poller.
pub struct EventProcessorHandler<P> {
    processor: P,
    exceptions: Arc<dyn ExceptionHandler>,
    last_processed_event_sequence: u64,
}

impl<P> EventProcessorHandler<P>
where
    P: EventProcessor,
{
    pub fn new(processor: P, exceptions: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            processor,
            exceptions,
            last_processed_event_sequence: NIL_SEQUENCE,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn last_processed_event_sequence(&self) -> u64 {
        self.last_processed_event_sequence
    }

    pub fn on_event(&mut self, record: &[u8], context: &mut CommandContext) -> ChronicleResult<PollResult> {
        let event = match RecordView::wrap(record, 0) {
            Ok(view) => view,
            Err(error) => {
                self.exceptions.handle_record_exception(record, &error);
                return Ok(PollResult::Poll);
            }
        };
        let header = match event.header() {
            Ok(header) if header.kind != RecordKind::Command => header,
            Ok(_) => return Ok(PollResult::Poll),
            Err(error) => {
                self.exceptions.handle_record_exception(record, &error);
                return Ok(PollResult::Poll);
            }
        };
        if is_at_or_before(header.event_sequence, self.last_processed_event_sequence) {
            trace!(event_sequence = header.event_sequence, "event already processed");
            return Ok(PollResult::Poll);
        }

        match self.processor.on_event(&event, context) {
            Ok(ProcessingDecision::Deferred) => {
                trace!(event_sequence = header.event_sequence, "event processing deferred");
                return Ok(PollResult::Peek);
            }
            Ok(ProcessingDecision::Processed) => {}
            Err(error) => self.exceptions.handle_event_processor_exception(&event, &error),
        }
        self.last_processed_event_sequence = header.event_sequence;
        Ok(PollResult::Poll)
    }
}

#[cfg(test)]
mod tests {
    use chronicle_core::{CommandId, EventType, RecordHeader, SourceId};

    use super::*;
    use crate::handler::recording::{Observed, RecordingHandler};
    use crate::in_memory_transport::channel;
    use crate::transport::MessageReceiver;

    fn event(source: i32, sequence: u64, event_sequence: u64, event_type: EventType) -> Vec<u8> {
        RecordHeader::event(
            CommandId::new(SourceId::new(source), sequence),
            0,
            event_sequence,
            event_type,
            0,
            2,
            0,
        )
        .to_record_bytes(&[])
        .unwrap()
    }

    fn processor<F>(f: F) -> F
    where
        F: FnMut(&RecordView<'_>, &mut CommandContext) -> anyhow::Result<ProcessingDecision> + Send,
    {
        f
    }

    #[test]
    fn defers_while_own_command_is_in_flight() {
        let (sender, mut receiver) = channel(8);
        let mut context = CommandContext::new(sender, || 0i64, 32);
        let mine = SourceId::new(50);
        let recorder = RecordingHandler::new();
        let mut handler = EventProcessorHandler::new(
            processor(move |_, context| {
                if context.has_in_flight_command_for(mine) {
                    return Ok(ProcessingDecision::Deferred);
                }
                context.send_command(mine, 1, b"follow-up")?;
                Ok(ProcessingDecision::Processed)
            }),
            recorder.clone(),
        );

        let first = event(1, 0, 0, EventType::AutoCommit);
        let second = event(1, 1, 1, EventType::AutoCommit);
        assert_eq!(handler.on_event(&first, &mut context).unwrap(), PollResult::Poll);
        assert_eq!(handler.on_event(&second, &mut context).unwrap(), PollResult::Peek);

        let echo = RecordHeader::event(CommandId::new(mine, 0), 0, 2, EventType::Commit, 0, 1, 0);
        context.on_event(&echo).unwrap();
        assert_eq!(handler.on_event(&second, &mut context).unwrap(), PollResult::Poll);

        let mut sent = 0;
        while receiver.poll(&mut |_| sent += 1) == 1 {}
        assert_eq!(sent, 2);
        assert!(recorder.observed().is_empty());
    }

    #[test]
    fn failures_are_reported_and_not_retried() {
        let (sender, _receiver) = channel(1);
        let mut context = CommandContext::new(sender, || 0i64, 32);
        let recorder = RecordingHandler::new();
        let mut calls = 0;
        let mut handler = EventProcessorHandler::new(
            processor(|_, _| {
                calls += 1;
                Err(anyhow::anyhow!("no"))
            }),
            recorder.clone(),
        );
        let record = event(1, 0, 3, EventType::Commit);

        assert_eq!(handler.on_event(&record, &mut context).unwrap(), PollResult::Poll);
        assert_eq!(handler.on_event(&record, &mut context).unwrap(), PollResult::Poll);
        assert_eq!(handler.last_processed_event_sequence(), 3);
        drop(handler);
        assert_eq!(calls, 1);
        assert_eq!(
            recorder.observed(),
            vec![Observed::EventProcessorFailed {
                event_sequence: 3,
                message: "no".to_string()
            }]
        );
    }
}
