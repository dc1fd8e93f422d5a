//! Append-only log storage.
//!
//! The engine talks to logs only through the `LogAppender`/`LogPoller`
//! contracts of `chronicle-events`; this module provides the in-process
//! implementation used for tests, benchmarks and embedded single-process use.

pub mod in_memory;

pub use in_memory::{InMemoryAppender, InMemoryLog, InMemoryPoller};
