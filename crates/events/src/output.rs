//! Publishing applied events to an external sink.
//!
//! A sink acknowledges each event with [`Ack::Commit`] or asks for another
//! attempt with [`Ack::Retry`]. The event handler never publishes to a sink
//! directly: it goes through [`RetryingOutput`], which bounds the retries and
//! never lets a broken sink hold up the pipeline.

use std::sync::Arc;

use chronicle_core::RecordView;
use tracing::{trace, warn};

use crate::handler::ExceptionHandler;

/// Sink acknowledgement for one publish attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ack {
    Commit,
    Retry,
}

/// External sink for applied events.
pub trait Output: Send {
    /// Publish `event`. `replay` is true while the engine rebuilds state from
    /// the event log; `retry` counts previous attempts for this event.
    fn publish(&mut self, event: &RecordView<'_>, replay: bool, retry: u32) -> anyhow::Result<Ack>;
}

impl<O> Output for Box<O>
where
    O: Output + ?Sized,
{
    fn publish(&mut self, event: &RecordView<'_>, replay: bool, retry: u32) -> anyhow::Result<Ack> {
        (**self).publish(event, replay, retry)
    }
}

/// Output that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutput;

impl Output for NoOutput {
    fn publish(&mut self, _event: &RecordView<'_>, _replay: bool, _retry: u32) -> anyhow::Result<Ack> {
        Ok(Ack::Commit)
    }
}

/// Bounded-retry wrapper around a sink.
///
/// The sink is invoked up to `max_attempts` times while it answers
/// [`Ack::Retry`]. A sink error, or exhausting the attempts, is reported to
/// the exception handler and the event is considered published anyway.
pub struct RetryingOutput<O> {
    inner: O,
    max_attempts: u32,
    exceptions: Arc<dyn ExceptionHandler>,
}

impl<O> RetryingOutput<O>
where
    O: Output,
{
    pub fn new(inner: O, max_attempts: u32, exceptions: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            exceptions,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut O {
        &mut self.inner
    }

    /// Publish `event`, retrying as requested. Never fails.
    pub fn deliver(&mut self, event: &RecordView<'_>, replay: bool) {
        for attempt in 0..self.max_attempts {
            match self.inner.publish(event, replay, attempt) {
                Ok(Ack::Commit) => return,
                Ok(Ack::Retry) => {
                    trace!(event_sequence = ?event.event_sequence().ok(), attempt, "output asked for retry");
                }
                Err(error) => {
                    self.exceptions.handle_event_output_exception(event, &error);
                    return;
                }
            }
        }

        warn!(
            event_sequence = ?event.event_sequence().ok(),
            attempts = self.max_attempts,
            "output retries exhausted; event treated as published"
        );
        let error = anyhow::anyhow!("output still requested retry after {} attempts", self.max_attempts);
        self.exceptions.handle_event_output_exception(event, &error);
    }
}

impl<O> Output for RetryingOutput<O>
where
    O: Output,
{
    fn publish(&mut self, event: &RecordView<'_>, replay: bool, _retry: u32) -> anyhow::Result<Ack> {
        self.deliver(event, replay);
        Ok(Ack::Commit)
    }
}

#[cfg(test)]
mod tests {
    use chronicle_core::{CommandId, EventType, RecordHeader, SourceId};

    use super::*;
    use crate::handler::recording::{Observed, RecordingHandler};

    struct Scripted {
        answers: Vec<anyhow::Result<Ack>>,
        calls: Vec<(bool, u32)>,
    }

    impl Output for Scripted {
        fn publish(&mut self, _event: &RecordView<'_>, replay: bool, retry: u32) -> anyhow::Result<Ack> {
            self.calls.push((replay, retry));
            if self.answers.is_empty() {
                Ok(Ack::Retry)
            } else {
                self.answers.remove(0)
            }
        }
    }

    fn event() -> Vec<u8> {
        RecordHeader::event(CommandId::new(SourceId::new(1), 0), 0, 12, EventType::Commit, 0, 1, 0)
            .to_record_bytes(&[])
            .unwrap()
    }

    #[test]
    fn retries_until_commit() {
        let recorder = RecordingHandler::new();
        let sink = Scripted {
            answers: vec![Ok(Ack::Retry), Ok(Ack::Retry), Ok(Ack::Commit)],
            calls: Vec::new(),
        };
        let mut output = RetryingOutput::new(sink, 5, recorder.clone());
        let bytes = event();

        output.deliver(&RecordView::wrap(&bytes, 0).unwrap(), true);

        assert_eq!(output.inner().calls, vec![(true, 0), (true, 1), (true, 2)]);
        assert!(recorder.observed().is_empty());
    }

    #[test]
    fn exhausted_retries_fail_open_and_loud() {
        let recorder = RecordingHandler::new();
        let sink = Scripted {
            answers: Vec::new(),
            calls: Vec::new(),
        };
        let mut output = RetryingOutput::new(sink, 3, recorder.clone());
        let bytes = event();

        let ack = output
            .publish(&RecordView::wrap(&bytes, 0).unwrap(), false, 0)
            .unwrap();

        assert_eq!(ack, Ack::Commit);
        assert_eq!(output.inner().calls.len(), 3);
        assert!(matches!(
            recorder.observed().as_slice(),
            [Observed::OutputFailed { event_sequence: 12, .. }]
        ));
    }

    #[test]
    fn sink_error_is_reported_without_retrying() {
        let recorder = RecordingHandler::new();
        let sink = Scripted {
            answers: vec![Err(anyhow::anyhow!("sink down"))],
            calls: Vec::new(),
        };
        let mut output = RetryingOutput::new(sink, 3, recorder.clone());
        let bytes = event();

        output.deliver(&RecordView::wrap(&bytes, 0).unwrap(), false);

        assert_eq!(output.inner().calls.len(), 1);
        assert_eq!(
            recorder.observed(),
            vec![Observed::OutputFailed {
                event_sequence: 12,
                message: "sink down".to_string()
            }]
        );
    }

    #[test]
    fn zero_attempts_still_publishes_once() {
        let output = RetryingOutput::new(NoOutput, 0, RecordingHandler::new());
        assert_eq!(output.max_attempts(), 1);
    }
}
