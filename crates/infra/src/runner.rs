//! Running an engine on its own thread.
//!
//! The engine itself never blocks; this runner supplies the idle strategy:
//! after a duty cycle with no work it sleeps for the configured idle interval.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Instant;

use chronicle_core::{ChronicleError, ChronicleResult};
use chronicle_events::{CommandProcessor, EventApplier, Output};
use serde::Serialize;
use tracing::{error, info};

use crate::engine::Engine;

/// Runtime statistics of a spawned engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub work_done: u64,
    pub uptime_secs: u64,
    /// Error that stopped the engine, if any.
    pub last_error: Option<String>,
}

/// Handle to control a running engine.
pub struct EngineHandle<P, A, O> {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<Engine<P, A, O>>>,
    stats: Arc<Mutex<EngineStats>>,
}

impl<P, A, O> EngineHandle<P, A, O> {
    /// Current engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// True once the engine thread has stopped (shutdown or failure).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|join| join.is_finished())
    }

    /// Request graceful shutdown and get the engine back.
    pub fn shutdown(mut self) -> ChronicleResult<Engine<P, A, O>> {
        let _ = self.shutdown.send(());
        let join = self
            .join
            .take()
            .ok_or_else(|| ChronicleError::illegal_state("engine thread already joined"))?;
        join.join()
            .map_err(|_| ChronicleError::illegal_state("engine thread panicked"))
    }
}

impl<P, A, O> Engine<P, A, O>
where
    P: CommandProcessor + 'static,
    A: EventApplier + 'static,
    O: Output + 'static,
{
    /// Move the engine onto a dedicated thread, starting it first if needed.
    ///
    /// A failing duty cycle stops the thread; the error is kept in the stats.
    pub fn spawn(self) -> ChronicleResult<EngineHandle<P, A, O>> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(EngineStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config().name.clone())
            .spawn(move || engine_loop(self, shutdown_rx, stats_clone))
            .map_err(|e| ChronicleError::illegal_state(format!("failed to spawn engine thread: {e}")))?;

        Ok(EngineHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn engine_loop<P, A, O>(
    mut engine: Engine<P, A, O>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<EngineStats>>,
) -> Engine<P, A, O>
where
    P: CommandProcessor,
    A: EventApplier,
    O: Output,
{
    let name = engine.config().name.clone();
    let idle_sleep = engine.config().idle_sleep();
    let start_time = Instant::now();

    if !engine.is_started() {
        if let Err(e) = engine.start() {
            error!(engine = %name, error = %e, "engine failed to start");
            record(&stats, |s| s.last_error = Some(e.to_string()));
            return engine;
        }
    }
    info!(engine = %name, "engine thread started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match engine.do_work() {
            Ok(work) => {
                record(&stats, |s| {
                    s.cycles += 1;
                    s.work_done += work as u64;
                    s.uptime_secs = start_time.elapsed().as_secs();
                    if work == 0 {
                        s.idle_cycles += 1;
                    }
                });
                if work == 0 {
                    thread::sleep(idle_sleep);
                }
            }
            Err(e) => {
                error!(engine = %name, error = %e, "duty cycle failed; engine stopped");
                record(&stats, |s| s.last_error = Some(e.to_string()));
                break;
            }
        }
    }

    info!(engine = %name, "engine thread stopped");
    engine
}

fn record(stats: &Mutex<EngineStats>, update: impl FnOnce(&mut EngineStats)) {
    if let Ok(mut s) = stats.lock() {
        update(&mut s);
    }
}
