//! Event handler chain: idempotent application of events to state.
//!
//! For each polled event:
//! 1. skip it if its event sequence was already applied;
//! 2. hand it to the application's [`EventApplier`];
//! 3. record it in [`BaseState`] (moving the dedup watermark on terminal events);
//! 4. publish it through the retrying output;
//! 5. let the command context see it for in-flight tracking.

use std::sync::Arc;

use chronicle_core::{ChronicleError, ChronicleResult, RecordHeader, RecordKind, RecordView};
use tracing::trace;

use crate::context::CommandContext;
use crate::handler::{DuplicateHandler, ExceptionHandler};
use crate::log::PollResult;
use crate::output::{Output, RetryingOutput};
use crate::state::BaseState;

/// Application logic folding events into application state.
pub trait EventApplier: Send {
    fn on_event(&mut self, event: &RecordView<'_>) -> anyhow::Result<()>;
}

impl<F> EventApplier for F
where
    F: FnMut(&RecordView<'_>) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, event: &RecordView<'_>) -> anyhow::Result<()> {
        self(event)
    }
}

pub struct EventHandler<A, O> {
    applier: A,
    output: RetryingOutput<O>,
    duplicates: Arc<dyn DuplicateHandler>,
    exceptions: Arc<dyn ExceptionHandler>,
    replay: bool,
}

impl<A, O> EventHandler<A, O>
where
    A: EventApplier,
    O: Output,
{
    pub fn new(
        applier: A,
        output: RetryingOutput<O>,
        duplicates: Arc<dyn DuplicateHandler>,
        exceptions: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            applier,
            output,
            duplicates,
            exceptions,
            replay: false,
        }
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    pub fn applier_mut(&mut self) -> &mut A {
        &mut self.applier
    }

    pub fn output(&self) -> &RetryingOutput<O> {
        &self.output
    }

    /// Mark events handled from now on as replayed history.
    pub fn set_replay(&mut self, replay: bool) {
        self.replay = replay;
    }

    pub fn is_replay(&self) -> bool {
        self.replay
    }

    /// Handle one encoded event record. Always consumes the record.
    ///
    /// Errors are protocol failures and must stop the pipeline.
    pub fn on_event(
        &mut self,
        record: &[u8],
        state: &mut BaseState,
        context: Option<&mut CommandContext>,
    ) -> ChronicleResult<PollResult> {
        let (event, header) = match decode_event(record) {
            Ok(decoded) => decoded,
            Err(error) => {
                self.exceptions.handle_record_exception(record, &error);
                return Ok(PollResult::Poll);
            }
        };

        if state.event_applied(header.event_sequence) {
            self.duplicates.skip_event_applying(&event);
            return Ok(PollResult::Poll);
        }

        if let Err(error) = self.applier.on_event(&event) {
            self.exceptions.handle_event_applier_exception(&event, &error);
        }
        state.apply_event(&header)?;
        self.output.deliver(&event, self.replay);
        if let Some(context) = context {
            context.on_event(&header)?;
        }
        trace!(
            source_id = %header.source_id,
            source_sequence = header.source_sequence,
            index = header.index,
            event_sequence = header.event_sequence,
            replay = self.replay,
            "event applied"
        );
        Ok(PollResult::Poll)
    }
}

fn decode_event(record: &[u8]) -> ChronicleResult<(RecordView<'_>, RecordHeader)> {
    let view = RecordView::wrap(record, 0)?;
    let header = view.header()?;
    if header.kind == RecordKind::Command {
        return Err(ChronicleError::invalid_record("command record found in event log"));
    }
    Ok((view, header))
}
