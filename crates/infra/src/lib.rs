//! Infrastructure layer: logs, configuration, the engine duty cycle.

pub mod config;
pub mod engine;
pub mod log_store;
pub mod runner;


pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, EngineLogs, PollerFactory};
pub use log_store::{InMemoryAppender, InMemoryLog, InMemoryPoller};
pub use runner::{EngineHandle, EngineStats};
