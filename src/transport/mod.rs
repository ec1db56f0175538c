//! Bounded, lossy, one-way message channel between producer and consumer.
//!
//! Each message is exactly one encoded frame; the channel preserves message
//! boundaries. Producers never block: once `depth` messages are outstanding
//! new frames are dropped at the sender.

pub mod endpoint;
pub mod memory;
pub mod socket;

use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;

pub use endpoint::{Endpoint, Scheme, DEFAULT_ENDPOINT};
pub use socket::{PullReceiver, PushSender, DEFAULT_MAX_MESSAGE_BYTES};

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Outstanding depth reached, the message was discarded.
    Dropped,
    /// The channel is closed for good.
    Disconnected,
}

/// Producer half.
pub trait FrameSink: Send {
    /// Queue one message without blocking.
    fn try_send(&self, msg: Bytes) -> SendOutcome;
}

/// Consumer half.
pub trait FrameSource: Send {
    /// Wait at most `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError>;
}

impl<T: FrameSink + Sync> FrameSink for std::sync::Arc<T> {
    fn try_send(&self, msg: Bytes) -> SendOutcome {
        (**self).try_send(msg)
    }
}

impl FrameSource for Box<dyn FrameSource> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        (**self).poll(timeout)
    }
}

/// Open the consumer side of `endpoint`, holding at most `depth` messages.
pub fn connect(
    endpoint: &Endpoint,
    depth: usize,
    max_message_bytes: usize,
) -> Result<Box<dyn FrameSource>, TransportError> {
    match endpoint.scheme() {
        Scheme::Tcp => Ok(Box::new(PullReceiver::connect(endpoint, depth, max_message_bytes)?)),
    }
}

/// Open the producer side of `endpoint` with `depth` outstanding messages.
pub fn bind(endpoint: &Endpoint, depth: usize) -> Result<PushSender, TransportError> {
    match endpoint.scheme() {
        Scheme::Tcp => PushSender::bind(endpoint, depth),
    }
}
