//! Strongly-typed identifiers for command sources and commands.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ChronicleError;
use crate::sequence::NIL_SEQUENCE;

/// Identifier of a command source (a logical origin with its own sequence).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(i32);

macro_rules! impl_int_newtype {
    ($t:ty, $inner:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $t {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $inner {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = ChronicleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = <$inner>::from_str(s)
                    .map_err(|e| ChronicleError::config(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_int_newtype!(SourceId, i32, "SourceId");

/// Identity of a command: `(source_id, source_sequence)`.
///
/// Every event carries the id of the command it was derived from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId {
    pub source_id: SourceId,
    pub source_sequence: u64,
}

impl CommandId {
    pub const fn new(source_id: SourceId, source_sequence: u64) -> Self {
        Self {
            source_id,
            source_sequence,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.source_sequence == NIL_SEQUENCE
    }
}

impl core::fmt::Display for CommandId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.source_id, self.source_sequence)
    }
}
