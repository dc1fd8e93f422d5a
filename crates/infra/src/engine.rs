//! Single-threaded engine pipeline (duty-cycle orchestration).
//!
//! The `Engine` wires the handler chains of `chronicle-events` to a command
//! log, an event log and a transport, and drives them cooperatively:
//!
//! ```text
//! transport receiver
//!   ↓ append
//! command log ──poll──► CommandHandler ──► EventRouter
//!                                            ↓ append
//! event log ──poll──► EventHandler ──► BaseState / Output / CommandContext
//!           ──poll──► EventProcessorHandler(s) ──► CommandContext ──► transport sender
//! ```
//!
//! ## Startup
//!
//! `start()` replays the whole event log through the event handler chain with
//! `replay = true`, seeds the router's event sequence from the rebuilt state
//! and positions every event processor at the end of the replayed history.
//! Commands are then re-read from the start of the command log; those whose
//! events were fully applied are skipped by the dedup watermark.
//!
//! ## Duty cycle
//!
//! `do_work()` never blocks. It returns how many units of work it did so an
//! external idle strategy can decide whether to back off.
//!
//! This module contains no IO itself; it composes the log and transport traits.

use std::sync::Arc;

use chronicle_core::{ChronicleError, ChronicleResult, RecordView, SourceId, SystemTimeSource, TimeSource};
use chronicle_events::in_memory_transport::channel;
use chronicle_events::{
    BaseState, CommandContext, CommandHandler, CommandProcessor, DuplicateHandler, EventApplier, EventHandler,
    EventProcessor, EventProcessorHandler, EventRouter, ExceptionHandler, LogAppender, LogPoller,
    LoggingDuplicateHandler, LoggingExceptionHandler, MessageReceiver, MessageSender, NoOutput, Output,
    PollResult, ProcessingDecision, RetryingOutput,
};
use tracing::{debug, info, info_span, Span};

use crate::config::EngineConfig;
use crate::log_store::InMemoryLog;

/// Creates event log pollers starting at a given position.
pub type PollerFactory = Box<dyn Fn(u64) -> Box<dyn LogPoller> + Send>;

/// Log endpoints an engine runs against.
pub struct EngineLogs {
    pub command_appender: Box<dyn LogAppender>,
    pub command_poller: Box<dyn LogPoller>,
    pub event_appender: Box<dyn LogAppender>,
    pub event_poller: Box<dyn LogPoller>,
    /// Used to give each event processor its own poller.
    pub event_pollers: PollerFactory,
}

impl EngineLogs {
    /// Endpoints over two in-memory logs.
    pub fn in_memory(command_log: &InMemoryLog, event_log: &InMemoryLog) -> Self {
        let processor_log = event_log.clone();
        Self {
            command_appender: Box::new(command_log.appender()),
            command_poller: Box::new(command_log.poller()),
            event_appender: Box::new(event_log.appender()),
            event_poller: Box::new(event_log.poller()),
            event_pollers: Box::new(move |position| -> Box<dyn LogPoller> {
                Box::new(processor_log.poller_from(position))
            }),
        }
    }
}

struct BoxedProcessor(Box<dyn EventProcessor>);

impl EventProcessor for BoxedProcessor {
    fn on_event(&mut self, event: &RecordView<'_>, context: &mut CommandContext) -> anyhow::Result<ProcessingDecision> {
        self.0.on_event(event, context)
    }
}

struct ProcessorSlot {
    handler: EventProcessorHandler<BoxedProcessor>,
    poller: Option<Box<dyn LogPoller>>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<P, A, O> {
    config: EngineConfig,
    processor: P,
    applier: A,
    output: O,
    duplicates: Arc<dyn DuplicateHandler>,
    exceptions: Arc<dyn ExceptionHandler>,
    time_source: Arc<dyn TimeSource + Sync>,
    transport: Option<(Box<dyn MessageSender>, Box<dyn MessageReceiver>)>,
    processors: Vec<Box<dyn EventProcessor>>,
    sources: Vec<SourceId>,
}

impl<P, A> EngineBuilder<P, A, NoOutput>
where
    P: CommandProcessor,
    A: EventApplier,
{
    pub fn new(processor: P, applier: A) -> Self {
        Self {
            config: EngineConfig::default(),
            processor,
            applier,
            output: NoOutput,
            duplicates: Arc::new(LoggingDuplicateHandler),
            exceptions: Arc::new(LoggingExceptionHandler),
            time_source: Arc::new(SystemTimeSource),
            transport: None,
            processors: Vec::new(),
            sources: Vec::new(),
        }
    }
}

impl<P, A, O> EngineBuilder<P, A, O>
where
    P: CommandProcessor,
    A: EventApplier,
    O: Output,
{
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_output<O2: Output>(self, output: O2) -> EngineBuilder<P, A, O2> {
        EngineBuilder {
            config: self.config,
            processor: self.processor,
            applier: self.applier,
            output,
            duplicates: self.duplicates,
            exceptions: self.exceptions,
            time_source: self.time_source,
            transport: self.transport,
            processors: self.processors,
            sources: self.sources,
        }
    }

    pub fn with_duplicate_handler(mut self, handler: Arc<dyn DuplicateHandler>) -> Self {
        self.duplicates = handler;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exceptions = handler;
        self
    }

    /// Clock for event and command times (defaults to wall-clock microseconds).
    pub fn with_time_source(mut self, time_source: impl TimeSource + Sync + 'static) -> Self {
        self.time_source = Arc::new(time_source);
        self
    }

    /// Transport for commands sent by event processors and commands received
    /// into the command log. Without one, the engine loops its own commands
    /// back to itself.
    pub fn with_transport(
        mut self,
        sender: impl MessageSender + 'static,
        receiver: impl MessageReceiver + 'static,
    ) -> Self {
        self.transport = Some((Box::new(sender), Box::new(receiver)));
        self
    }

    pub fn with_event_processor(mut self, processor: impl EventProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Source the command context sends on; its sequence is recovered during replay.
    pub fn with_command_source(mut self, source_id: SourceId) -> Self {
        self.sources.push(source_id);
        self
    }

    pub fn build(self, logs: EngineLogs) -> ChronicleResult<Engine<P, A, O>> {
        self.config.validate()?;
        let config = self.config;

        let (sender, receiver) = match self.transport {
            Some(transport) => transport,
            None => {
                let (sender, receiver) = channel(config.loopback_capacity);
                (
                    Box::new(sender) as Box<dyn MessageSender>,
                    Box::new(receiver) as Box<dyn MessageReceiver>,
                )
            }
        };

        let router = EventRouter::new(logs.event_appender, clock(&self.time_source), config.max_payload_size);
        let command_handler = CommandHandler::new(
            self.processor,
            router,
            self.duplicates.clone(),
            self.exceptions.clone(),
        );
        let event_handler = EventHandler::new(
            self.applier,
            RetryingOutput::new(self.output, config.output_max_attempts, self.exceptions.clone()),
            self.duplicates,
            self.exceptions.clone(),
        );

        let mut context = CommandContext::new(sender, clock(&self.time_source), config.max_payload_size);
        for source_id in self.sources {
            context.register_source(source_id)?;
        }

        let processors = self
            .processors
            .into_iter()
            .map(|processor| ProcessorSlot {
                handler: EventProcessorHandler::new(BoxedProcessor(processor), self.exceptions.clone()),
                poller: None,
            })
            .collect();

        let span = info_span!("engine", name = %config.name);
        Ok(Engine {
            config,
            state: BaseState::new(),
            command_handler,
            event_handler,
            context,
            processors,
            exceptions: self.exceptions,
            receiver,
            command_appender: logs.command_appender,
            command_poller: logs.command_poller,
            event_poller: logs.event_poller,
            event_pollers: logs.event_pollers,
            started: false,
            span,
        })
    }

    /// Build over two in-memory logs.
    pub fn build_in_memory(self, command_log: &InMemoryLog, event_log: &InMemoryLog) -> ChronicleResult<Engine<P, A, O>> {
        self.build(EngineLogs::in_memory(command_log, event_log))
    }
}

fn clock(time_source: &Arc<dyn TimeSource + Sync>) -> impl TimeSource + 'static {
    let time_source = time_source.clone();
    move || time_source.now()
}

/// Offer one record from `poller` to `handle`, surfacing handler errors.
fn poll_with<F>(poller: &mut dyn LogPoller, mut handle: F) -> ChronicleResult<usize>
where
    F: FnMut(&[u8]) -> ChronicleResult<PollResult>,
{
    let mut failure = None;
    let polled = poller.poll(&mut |record| match handle(record) {
        Ok(result) => result,
        Err(error) => {
            failure = Some(error);
            PollResult::Peek
        }
    })?;
    match failure {
        Some(error) => Err(error),
        None => Ok(polled),
    }
}

/// One event-sourced pipeline.
pub struct Engine<P, A, O = NoOutput> {
    config: EngineConfig,
    state: BaseState,
    command_handler: CommandHandler<P>,
    event_handler: EventHandler<A, O>,
    context: CommandContext,
    processors: Vec<ProcessorSlot>,
    exceptions: Arc<dyn ExceptionHandler>,
    receiver: Box<dyn MessageReceiver>,
    command_appender: Box<dyn LogAppender>,
    command_poller: Box<dyn LogPoller>,
    event_poller: Box<dyn LogPoller>,
    event_pollers: PollerFactory,
    started: bool,
    span: Span,
}

impl<P, A, O> Engine<P, A, O>
where
    P: CommandProcessor,
    A: EventApplier,
    O: Output,
{
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &BaseState {
        &self.state
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CommandContext {
        &mut self.context
    }

    pub fn command_handler(&self) -> &CommandHandler<P> {
        &self.command_handler
    }

    pub fn event_handler(&self) -> &EventHandler<A, O> {
        &self.event_handler
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Stop processing commands; they stay in the command log until `resume()`.
    pub fn pause(&mut self) {
        self.command_handler.pause();
    }

    pub fn resume(&mut self) {
        self.command_handler.resume();
    }

    /// Rebuild state from the event log. Returns the number of replayed events.
    pub fn start(&mut self) -> ChronicleResult<usize> {
        if self.started {
            return Err(ChronicleError::illegal_state("engine already started"));
        }
        let span = self.span.clone();
        let _enter = span.enter();
        info!("replay started");

        self.event_handler.set_replay(true);
        let mut replayed = 0;
        loop {
            let polled = poll_with(self.event_poller.as_mut(), |record| {
                self.event_handler
                    .on_event(record, &mut self.state, Some(&mut self.context))
            });
            match polled {
                Ok(0) => break,
                Ok(n) => replayed += n,
                Err(error) => {
                    self.event_handler.set_replay(false);
                    return Err(error);
                }
            }
        }
        self.event_handler.set_replay(false);

        self.command_handler
            .router_mut()
            .resume_after(self.state.last_applied_event_sequence())?;
        let position = self.event_poller.position();
        for slot in &mut self.processors {
            slot.poller = Some((self.event_pollers)(position));
        }
        self.started = true;
        info!(
            replayed,
            last_event_sequence = self.state.last_applied_event_sequence(),
            processors = self.processors.len(),
            "replay finished"
        );
        Ok(replayed)
    }

    /// Run one duty cycle. Returns the amount of work done.
    pub fn do_work(&mut self) -> ChronicleResult<usize> {
        if !self.started {
            return Err(ChronicleError::illegal_state("engine not started"));
        }
        let span = self.span.clone();
        let _enter = span.enter();

        let mut work = self.receive_commands()?;

        for _ in 0..self.config.commands_per_cycle {
            let polled = poll_with(self.command_poller.as_mut(), |record| {
                self.command_handler.on_command(record, &self.state)
            })?;
            if polled == 0 {
                break;
            }
            work += polled;
        }

        for _ in 0..self.config.events_per_cycle {
            let polled = poll_with(self.event_poller.as_mut(), |record| {
                self.event_handler
                    .on_event(record, &mut self.state, Some(&mut self.context))
            })?;
            if polled == 0 {
                break;
            }
            work += polled;
        }

        for slot in &mut self.processors {
            let Some(poller) = slot.poller.as_mut() else {
                continue;
            };
            for _ in 0..self.config.events_per_cycle {
                let polled = poll_with(poller.as_mut(), |record| slot.handler.on_event(record, &mut self.context))?;
                if polled == 0 {
                    break;
                }
                work += polled;
            }
        }

        Ok(work)
    }

    /// Run duty cycles until one does no work, at most `max_cycles` times.
    /// Returns the total amount of work done.
    pub fn run_until_idle(&mut self, max_cycles: usize) -> ChronicleResult<usize> {
        let mut total = 0;
        for _ in 0..max_cycles {
            let work = self.do_work()?;
            if work == 0 {
                break;
            }
            total += work;
        }
        Ok(total)
    }

    fn receive_commands(&mut self) -> ChronicleResult<usize> {
        let mut received = 0;
        for _ in 0..self.config.messages_per_cycle {
            let appender = &mut self.command_appender;
            let exceptions = &self.exceptions;
            let mut failure = None;
            let polled = self.receiver.poll(&mut |message| match appender.append(message) {
                Ok(_) => {}
                Err(ChronicleError::Log(reason)) => failure = Some(ChronicleError::Log(reason)),
                Err(error) => {
                    debug!(error = %error, "received message rejected by command log");
                    exceptions.handle_record_exception(message, &error);
                }
            });
            if let Some(error) = failure {
                return Err(error);
            }
            if polled == 0 {
                break;
            }
            received += polled;
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use chronicle_core::{EventType, RecordHeader};

    use super::*;

    fn echo(command: &RecordView<'_>, router: &mut EventRouter) -> anyhow::Result<()> {
        router.route_event(command.payload_type()?, command.payload())?;
        Ok(())
    }

    fn ignore(_: &RecordView<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn do_work_requires_start() {
        let mut engine = EngineBuilder::new(echo, ignore)
            .build_in_memory(&InMemoryLog::new(), &InMemoryLog::new())
            .unwrap();
        assert!(matches!(engine.do_work(), Err(ChronicleError::IllegalState(_))));
        assert_eq!(engine.start().unwrap(), 0);
        assert!(matches!(engine.start(), Err(ChronicleError::IllegalState(_))));
        assert_eq!(engine.do_work().unwrap(), 0);
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let result = EngineBuilder::new(echo, ignore)
            .with_config(EngineConfig::default().with_events_per_cycle(0))
            .build_in_memory(&InMemoryLog::new(), &InMemoryLog::new());
        assert!(matches!(result, Err(ChronicleError::Config(_))));
    }

    #[test]
    fn one_cycle_turns_a_logged_command_into_an_applied_event() {
        let commands = InMemoryLog::new();
        let events = InMemoryLog::new();
        let command = RecordHeader::command(SourceId::new(1), 0, 5, 42, 0)
            .to_record_bytes(b"payload")
            .unwrap();
        commands.appender().append(&command).unwrap();

        let mut engine = EngineBuilder::new(echo, ignore)
            .with_time_source(|| 99i64)
            .build_in_memory(&commands, &events)
            .unwrap();
        engine.start().unwrap();
        assert_eq!(engine.do_work().unwrap(), 2);

        let event = events.get(0).unwrap();
        let view = RecordView::wrap(&event, 0).unwrap();
        assert_eq!(view.event_type().unwrap(), EventType::Commit);
        assert_eq!(view.payload_type().unwrap(), 42);
        assert_eq!(view.time().unwrap(), 99);
        assert_eq!(view.payload(), b"payload");
        assert_eq!(engine.state().last_applied_event_sequence(), 0);
    }
}
