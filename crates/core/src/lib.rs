//! `chronicle-core` — engine foundation building blocks.
//!
//! This crate contains the pure primitives shared by every pipeline stage:
//! identifiers, sequences, the binary record codec and the error model.
//! No I/O lives here.

pub mod error;
pub mod id;
pub mod record;
pub mod sequence;
pub mod time;

pub use error::{ChronicleError, ChronicleResult};
pub use id::{CommandId, SourceId};
pub use record::{EventType, RecordHeader, RecordKind, RecordView, RecordViewMut};
pub use sequence::{NIL_SEQUENCE, SequenceGenerator};
pub use time::{SystemTimeSource, TimeSource};
