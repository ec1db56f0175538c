//! In-process transport with the same drop-on-full policy as the ZeroMQ one.

use std::time::Duration;

use bytes::Bytes;
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};

use super::{FrameSink, FrameSource, SendOutcome};
use crate::error::TransportError;

pub struct MemorySender {
    tx: Sender<Bytes>,
}

pub struct MemoryReceiver {
    rx: Receiver<Bytes>,
}

/// Bounded pair holding at most `depth` undelivered messages.
pub fn channel(depth: usize) -> (MemorySender, MemoryReceiver) {
    let (tx, rx) = flume::bounded(depth.max(1));
    (MemorySender { tx }, MemoryReceiver { rx })
}

impl MemorySender {
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

impl FrameSink for MemorySender {
    fn try_send(&self, msg: Bytes) -> SendOutcome {
        match self.tx.try_send(msg) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Disconnected(_)) => SendOutcome::Disconnected,
        }
    }
}

impl FrameSource for MemoryReceiver {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // Senders gone: behave like an idle queue so the worker still
            // honours its stop flag at poll cadence.
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn overload_drops_without_blocking() {
        let (tx, mut rx) = channel(2);
        let start = Instant::now();
        let outcomes: Vec<_> = (0..50u8).map(|i| tx.try_send(Bytes::from(vec![i]))).collect();
        assert!(start.elapsed() < Duration::from_millis(100));

        assert_eq!(outcomes.iter().filter(|o| **o == SendOutcome::Queued).count(), 2);
        assert_eq!(outcomes.iter().filter(|o| **o == SendOutcome::Dropped).count(), 48);
        assert_eq!(tx.pending(), 2);

        let mut received = Vec::new();
        while let Some(msg) = rx.poll(Duration::from_millis(10)).unwrap() {
            received.push(msg[0]);
        }
        // Oldest are kept, newest dropped.
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn poll_is_bounded_when_idle() {
        let (_tx, mut rx) = channel(2);
        let start = Instant::now();
        assert!(rx.poll(Duration::from_millis(30)).unwrap().is_none());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(25));
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn closed_receiver_reports_disconnect() {
        let (tx, rx) = channel(2);
        drop(rx);
        assert_eq!(tx.try_send(Bytes::from_static(b"x")), SendOutcome::Disconnected);
    }
}
