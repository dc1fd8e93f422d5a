//! Strategies for duplicates and failures observed by the handler chains.
//!
//! Both strategies are selected when the pipeline is built and shared between
//! the command handler, event handler, event processors and output. They take
//! `&self` so one instance can be handed to every stage behind an `Arc`.
//!
//! ## Failure policy
//!
//! Application callback failures are reported here and the pipeline moves on:
//! the record that triggered the failure still counts as handled, so a
//! persistently failing callback cannot wedge a log.

use std::sync::Arc;

use chronicle_core::{ChronicleError, RecordView};
use tracing::{debug, error, warn};

/// Notified when a record is skipped because it was already handled.
pub trait DuplicateHandler: Send + Sync {
    /// A command whose events were all applied in a previous run.
    fn skip_command_processing(&self, command: &RecordView<'_>);

    /// An event whose sequence was already applied.
    fn skip_event_applying(&self, event: &RecordView<'_>);
}

/// Receives failures caught at a handler chain boundary.
pub trait ExceptionHandler: Send + Sync {
    /// The command processor failed.
    fn handle_command_processor_exception(&self, command: &RecordView<'_>, error: &anyhow::Error);

    /// The event applier failed.
    fn handle_event_applier_exception(&self, event: &RecordView<'_>, error: &anyhow::Error);

    /// An event processor failed.
    fn handle_event_processor_exception(&self, event: &RecordView<'_>, error: &anyhow::Error);

    /// Publishing to the output failed or exhausted its retries.
    fn handle_event_output_exception(&self, event: &RecordView<'_>, error: &anyhow::Error);

    /// A record could not be decoded, or a collaborator reported a protocol error.
    fn handle_record_exception(&self, record: &[u8], error: &ChronicleError);
}

impl<H> DuplicateHandler for Arc<H>
where
    H: DuplicateHandler + ?Sized,
{
    fn skip_command_processing(&self, command: &RecordView<'_>) {
        (**self).skip_command_processing(command)
    }

    fn skip_event_applying(&self, event: &RecordView<'_>) {
        (**self).skip_event_applying(event)
    }
}

impl<H> ExceptionHandler for Arc<H>
where
    H: ExceptionHandler + ?Sized,
{
    fn handle_command_processor_exception(&self, command: &RecordView<'_>, error: &anyhow::Error) {
        (**self).handle_command_processor_exception(command, error)
    }

    fn handle_event_applier_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        (**self).handle_event_applier_exception(event, error)
    }

    fn handle_event_processor_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        (**self).handle_event_processor_exception(event, error)
    }

    fn handle_event_output_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        (**self).handle_event_output_exception(event, error)
    }

    fn handle_record_exception(&self, record: &[u8], error: &ChronicleError) {
        (**self).handle_record_exception(record, error)
    }
}

/// Logs skipped duplicates at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDuplicateHandler;

impl DuplicateHandler for LoggingDuplicateHandler {
    fn skip_command_processing(&self, command: &RecordView<'_>) {
        debug!(
            source_id = ?command.source_id().ok(),
            source_sequence = ?command.source_sequence().ok(),
            "skipping command already applied"
        );
    }

    fn skip_event_applying(&self, event: &RecordView<'_>) {
        debug!(
            source_id = ?event.source_id().ok(),
            source_sequence = ?event.source_sequence().ok(),
            event_sequence = ?event.event_sequence().ok(),
            "skipping event already applied"
        );
    }
}

/// Logs every failure through `tracing` and lets the pipeline continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_command_processor_exception(&self, command: &RecordView<'_>, error: &anyhow::Error) {
        error!(
            source_id = ?command.source_id().ok(),
            source_sequence = ?command.source_sequence().ok(),
            error = %error,
            "command processor failed"
        );
    }

    fn handle_event_applier_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        error!(
            event_sequence = ?event.event_sequence().ok(),
            index = ?event.index().ok(),
            error = %error,
            "event applier failed"
        );
    }

    fn handle_event_processor_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        error!(
            event_sequence = ?event.event_sequence().ok(),
            error = %error,
            "event processor failed"
        );
    }

    fn handle_event_output_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
        warn!(
            event_sequence = ?event.event_sequence().ok(),
            error = %error,
            "event output failed"
        );
    }

    fn handle_record_exception(&self, record: &[u8], error: &ChronicleError) {
        error!(length = record.len(), error = %error, "record rejected");
    }
}

/// Test doubles that remember what they were told.
///
/// Only built for tests and with the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub mod recording {
    use std::sync::Mutex;

    use super::*;

    /// What a [`RecordingHandler`] observed, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Observed {
        SkippedCommand { source_sequence: u64 },
        SkippedEvent { event_sequence: u64 },
        CommandProcessorFailed { source_sequence: u64, message: String },
        EventApplierFailed { event_sequence: u64, message: String },
        EventProcessorFailed { event_sequence: u64, message: String },
        OutputFailed { event_sequence: u64, message: String },
        RecordRejected { error: ChronicleError },
    }

    /// Duplicate and exception handler that records every notification.
    #[derive(Debug, Default)]
    pub struct RecordingHandler {
        observed: Mutex<Vec<Observed>>,
    }

    impl RecordingHandler {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn observed(&self) -> Vec<Observed> {
            self.observed.lock().map(|o| o.clone()).unwrap_or_default()
        }

        fn push(&self, item: Observed) {
            if let Ok(mut observed) = self.observed.lock() {
                observed.push(item);
            }
        }
    }

    fn sequence(result: chronicle_core::ChronicleResult<u64>) -> u64 {
        result.unwrap_or(chronicle_core::NIL_SEQUENCE)
    }

    impl DuplicateHandler for RecordingHandler {
        fn skip_command_processing(&self, command: &RecordView<'_>) {
            self.push(Observed::SkippedCommand {
                source_sequence: sequence(command.source_sequence()),
            });
        }

        fn skip_event_applying(&self, event: &RecordView<'_>) {
            self.push(Observed::SkippedEvent {
                event_sequence: sequence(event.event_sequence()),
            });
        }
    }

    impl ExceptionHandler for RecordingHandler {
        fn handle_command_processor_exception(&self, command: &RecordView<'_>, error: &anyhow::Error) {
            self.push(Observed::CommandProcessorFailed {
                source_sequence: sequence(command.source_sequence()),
                message: error.to_string(),
            });
        }

        fn handle_event_applier_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
            self.push(Observed::EventApplierFailed {
                event_sequence: sequence(event.event_sequence()),
                message: error.to_string(),
            });
        }

        fn handle_event_processor_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
            self.push(Observed::EventProcessorFailed {
                event_sequence: sequence(event.event_sequence()),
                message: error.to_string(),
            });
        }

        fn handle_event_output_exception(&self, event: &RecordView<'_>, error: &anyhow::Error) {
            self.push(Observed::OutputFailed {
                event_sequence: sequence(event.event_sequence()),
                message: error.to_string(),
            });
        }

        fn handle_record_exception(&self, _record: &[u8], error: &ChronicleError) {
            self.push(Observed::RecordRejected {
                error: error.clone(),
            });
        }
    }
}
