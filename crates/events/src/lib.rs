//! `chronicle-events`: the command/event protocol.
//!
//! This crate contains the deterministic, storage-agnostic parts of the
//! engine:
//!
//! - **Collaborator contracts**: append-only logs (`LogAppender`,
//!   `LogPoller`) and message transports (`MessageSender`, `MessageReceiver`).
//! - **Handler chains**: `CommandHandler` turns commands into events through
//!   the `EventRouter`; `EventHandler` applies events idempotently to
//!   `BaseState` and publishes them through a `RetryingOutput`.
//! - **Command sending**: `CommandContext` stamps follow-up commands from
//!   `EventProcessor`s and tracks which of them are still in flight.
//!
//! Everything here is single-threaded and non-blocking; wiring the pieces
//! into a duty cycle is left to the infrastructure layer.

pub mod command_handler;
pub mod context;
pub mod event_handler;
pub mod handler;
pub mod in_memory_transport;
pub mod log;
pub mod output;
pub mod processor;
pub mod router;
pub mod source;
pub mod state;
pub mod transport;

pub use command_handler::{CommandHandler, CommandProcessor};
pub use context::{CommandContext, SendingContext};
pub use event_handler::{EventApplier, EventHandler};
pub use handler::{DuplicateHandler, ExceptionHandler, LoggingDuplicateHandler, LoggingExceptionHandler};
#[cfg(any(test, feature = "test-util"))]
pub use log::CapturingAppender;
pub use log::{LogAppender, LogPoller, PollResult};
pub use output::{Ack, NoOutput, Output, RetryingOutput};
pub use processor::{EventProcessor, EventProcessorHandler, ProcessingDecision};
pub use router::{EventRouter, RollbackMode, RouterState, RoutingContext};
pub use source::{CommandSource, CommandSourceRegistry};
pub use state::{AppliedEvent, BaseState};
pub use transport::{MessageReceiver, MessageSender, SendingResult};
