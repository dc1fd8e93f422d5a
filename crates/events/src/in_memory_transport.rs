//! In-memory bounded transport for tests/dev.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};

use crate::transport::{MessageReceiver, MessageSender, SendingResult};

/// Create a connected sender/receiver pair holding at most `capacity` messages.
///
/// - No IO / no async
/// - A full channel reports `BackPressured`
/// - A dropped receiver reports `Disconnected`
pub fn channel(capacity: usize) -> (InMemorySender, InMemoryReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (InMemorySender { tx }, InMemoryReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct InMemorySender {
    tx: SyncSender<Vec<u8>>,
}

impl MessageSender for InMemorySender {
    fn send(&mut self, message: &[u8]) -> SendingResult {
        match self.tx.try_send(message.to_vec()) {
            Ok(()) => SendingResult::Sent,
            Err(TrySendError::Full(_)) => SendingResult::BackPressured,
            Err(TrySendError::Disconnected(_)) => SendingResult::Disconnected,
        }
    }
}

#[derive(Debug)]
pub struct InMemoryReceiver {
    rx: Receiver<Vec<u8>>,
}

impl MessageReceiver for InMemoryReceiver {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8])) -> usize {
        match self.rx.try_recv() {
            Ok(message) => {
                handler(&message);
                1
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order_and_reports_back_pressure() {
        let (mut tx, mut rx) = channel(2);
        assert_eq!(tx.send(b"a"), SendingResult::Sent);
        assert_eq!(tx.send(b"b"), SendingResult::Sent);
        assert_eq!(tx.send(b"c"), SendingResult::BackPressured);

        let mut seen = Vec::new();
        while rx.poll(&mut |m| seen.push(m.to_vec())) == 1 {}
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn dropped_receiver_reports_disconnected() {
        let (mut tx, rx) = channel(1);
        drop(rx);
        assert_eq!(tx.send(b"a"), SendingResult::Disconnected);
        assert!(SendingResult::Disconnected.is_retryable());
        assert!(!SendingResult::Disconnected.is_accepted());
    }
}
