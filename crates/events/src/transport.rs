//! Message transport abstraction (mechanics only).
//!
//! Transports carry encoded command records between processes: a sender on
//! the producing side, a receiver feeding the engine's command log on the
//! consuming side.
//!
//! ## Design Philosophy
//!
//! - **Non-blocking**: `send` and `poll` return immediately with a status; a
//!   congested or broken transport is reported, never waited on.
//! - **At-least-once**: messages may arrive twice; the command handler chain
//!   deduplicates by `(source_id, source_sequence)`.
//! - **No persistence**: received commands are appended to the command log,
//!   which is the source of truth for replay.

/// Status of a single send attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SendingResult {
    /// Handed to the transport and flushed.
    Sent,
    /// Accepted by the transport; delivery completes later.
    Pending,
    /// Transport is congested; retry later.
    BackPressured,
    /// No peer is connected.
    Disconnected,
    /// Transport failed for another reason.
    Failed,
}

impl SendingResult {
    /// True if the transport took ownership of the message.
    ///
    /// Only accepted sends consume a source sequence.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Sent | Self::Pending)
    }

    /// True if retrying the same send later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::BackPressured | Self::Disconnected)
    }
}

/// Sending half of a transport.
pub trait MessageSender: Send {
    fn send(&mut self, message: &[u8]) -> SendingResult;
}

/// Receiving half of a transport.
pub trait MessageReceiver: Send {
    /// Deliver at most one pending message to `handler`; returns the number delivered.
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8])) -> usize;
}

impl<S> MessageSender for Box<S>
where
    S: MessageSender + ?Sized,
{
    fn send(&mut self, message: &[u8]) -> SendingResult {
        (**self).send(message)
    }
}

impl<R> MessageReceiver for Box<R>
where
    R: MessageReceiver + ?Sized,
{
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8])) -> usize {
        (**self).poll(handler)
    }
}
