//! ZeroMQ transport: the producer binds a PUSH socket, the consumer connects
//! a PULL socket.
//!
//! Both ends cap their queues at the configured depth (SNDHWM/RCVHWM) and
//! keep kernel buffers small, so a stalled consumer holds only a handful of
//! stale frames and the producer starts dropping instead of buffering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::utils::CachePadded;
use tracing::{debug, info, instrument, warn};

use super::{Endpoint, FrameSink, FrameSource, SendOutcome};
use crate::error::TransportError;

/// Largest message the receiver accepts; bigger ones drop the connection.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Kernel send/receive buffer per socket. Setting it also stops the kernel
/// from growing the buffers on its own.
const SOCKET_BUFFER_BYTES: i32 = 256 * 1024;
/// How long queued frames may still be flushed when the producer closes.
const SEND_LINGER_MS: i32 = 100;
const RECONNECT_IVL_MS: i32 = 20;

fn high_water_mark(depth: usize) -> i32 {
    i32::try_from(depth.max(1)).unwrap_or(i32::MAX)
}

fn millis(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Default)]
struct SendStats {
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Producer side. Sends never block: once `depth` messages are outstanding
/// (or nobody is connected) the frame is dropped.
pub struct PushSender {
    socket: zmq::Socket,
    // Dropped after the socket.
    _context: zmq::Context,
    endpoint: Endpoint,
    stats: CachePadded<SendStats>,
}

impl PushSender {
    #[instrument(skip(endpoint), fields(endpoint = %endpoint))]
    pub fn bind(endpoint: &Endpoint, depth: usize) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUSH)?;
        socket.set_sndhwm(high_water_mark(depth))?;
        socket.set_sndbuf(SOCKET_BUFFER_BYTES)?;
        socket.set_linger(SEND_LINGER_MS)?;
        socket.set_ipv6(endpoint.is_ipv6())?;
        socket.bind(&endpoint.bind_address())?;

        let bound = match socket.get_last_endpoint()? {
            Ok(last) => last.parse()?,
            Err(_) => endpoint.clone(),
        };
        info!(bound = %bound, depth, "producer bound");

        Ok(Self {
            socket,
            _context: context,
            endpoint: bound,
            stats: CachePadded::new(SendStats::default()),
        })
    }

    /// Bound address; carries the real port when port 0 was requested.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// `(queued, dropped)` since bind.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.queued.load(Ordering::Relaxed),
            self.stats.dropped.load(Ordering::Relaxed),
        )
    }
}

impl FrameSink for PushSender {
    fn try_send(&self, msg: Bytes) -> SendOutcome {
        match self.socket.send(&msg[..], zmq::DONTWAIT) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Queued
            }
            Err(zmq::Error::EAGAIN) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
            Err(zmq::Error::ETERM) => SendOutcome::Disconnected,
            Err(e) => {
                warn!(error = %e, "send failed, frame dropped");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
        }
    }
}

/// Consumer side. Connects in the background and reconnects after the
/// producer goes away; a poll never waits longer than its timeout.
pub struct PullReceiver {
    socket: zmq::Socket,
    _context: zmq::Context,
    endpoint: Endpoint,
}

impl PullReceiver {
    #[instrument(skip(endpoint), fields(endpoint = %endpoint))]
    pub fn connect(endpoint: &Endpoint, depth: usize, max_message_bytes: usize) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PULL)?;
        socket.set_rcvhwm(high_water_mark(depth))?;
        socket.set_rcvbuf(SOCKET_BUFFER_BYTES)?;
        socket.set_maxmsgsize(i64::try_from(max_message_bytes).unwrap_or(i64::MAX))?;
        socket.set_linger(0)?;
        socket.set_reconnect_ivl(RECONNECT_IVL_MS)?;
        socket.set_ipv6(endpoint.is_ipv6())?;
        socket.connect(&endpoint.to_string())?;
        debug!("consumer connecting");

        Ok(Self {
            socket,
            _context: context,
            endpoint: endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl FrameSource for PullReceiver {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        match self.socket.poll(zmq::POLLIN, millis(timeout)) {
            Ok(0) | Err(zmq::Error::EINTR) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        match self.socket.recv_bytes(zmq::DONTWAIT) {
            Ok(msg) => Ok(Some(Bytes::from(msg))),
            Err(zmq::Error::EAGAIN | zmq::Error::EINTR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn loopback() -> Endpoint {
        "tcp://127.0.0.1:0".parse().unwrap()
    }

    fn drain(rx: &mut PullReceiver, want: usize) -> Vec<Bytes> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while got.len() < want && Instant::now() < deadline {
            if let Some(msg) = rx.poll(Duration::from_millis(100)).unwrap() {
                got.push(msg);
            }
        }
        got
    }

    /// Sender and receiver with the connection already established.
    fn connected(depth: usize) -> (PushSender, PullReceiver) {
        let sender = PushSender::bind(&loopback(), depth).unwrap();
        let mut rx = PullReceiver::connect(sender.endpoint(), depth, DEFAULT_MAX_MESSAGE_BYTES).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sender.try_send(Bytes::from_static(b"hello")) != SendOutcome::Queued {
            assert!(Instant::now() < deadline, "consumer never connected");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(drain(&mut rx, 1), vec![Bytes::from_static(b"hello")]);
        (sender, rx)
    }

    #[test]
    fn ephemeral_port_is_reported() {
        let sender = PushSender::bind(&loopback(), 2).unwrap();
        assert_eq!(sender.endpoint().host(), "127.0.0.1");
        assert_ne!(sender.endpoint().port(), 0);
    }

    #[test]
    fn preserves_message_boundaries() {
        let (sender, mut rx) = connected(8);

        let big: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let msgs = [Bytes::from_static(b"a"), Bytes::from(big), Bytes::new(), Bytes::from_static(b"tail")];
        for msg in &msgs {
            assert_eq!(sender.try_send(msg.clone()), SendOutcome::Queued);
        }
        assert_eq!(drain(&mut rx, msgs.len()), msgs.to_vec());
    }

    #[test]
    fn drops_when_nobody_is_connected() {
        let sender = PushSender::bind(&loopback(), 2).unwrap();
        let start = Instant::now();
        let queued = (0..20)
            .filter(|_| sender.try_send(Bytes::from_static(b"frame")) == SendOutcome::Queued)
            .count();
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(queued, 0);
        assert_eq!(sender.stats(), (0, 20));
    }

    #[test]
    fn stalled_consumer_backlog_stays_bounded() {
        let depth = 2;
        let (sender, mut rx) = connected(depth);

        // Consumer stops reading; the producer keeps sending frame-sized messages.
        let frame = Bytes::from(vec![9u8; 1 << 20]);
        let (_, dropped_before) = sender.stats();
        let start = Instant::now();
        let queued = (0..200)
            .filter(|_| {
                let outcome = sender.try_send(frame.clone());
                thread::sleep(Duration::from_millis(1));
                outcome == SendOutcome::Queued
            })
            .count();
        assert!(start.elapsed() < Duration::from_secs(10));

        let mut received = 0;
        while rx.poll(Duration::from_millis(300)).unwrap().is_some() {
            received += 1;
        }
        assert!(queued < 200);
        assert!(received <= queued);
        assert!(received <= 4 * depth + 4, "backlog of {received} frames");
        assert_eq!(sender.stats().1 - dropped_before, 200 - queued as u64);
    }

    #[test]
    fn poll_returns_after_timeout_without_producer() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let mut rx = PullReceiver::connect(&loopback().with_port(port), 2, DEFAULT_MAX_MESSAGE_BYTES).unwrap();
        let start = Instant::now();
        assert!(rx.poll(Duration::from_millis(100)).unwrap().is_none());
        let took = start.elapsed();
        assert!(took >= Duration::from_millis(90));
        assert!(took < Duration::from_secs(1));
    }

    #[test]
    fn oversized_messages_are_not_delivered() {
        let sender = PushSender::bind(&loopback(), 4).unwrap();
        let mut rx = PullReceiver::connect(sender.endpoint(), 4, 64).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sender.try_send(Bytes::from(vec![0u8; 1024])) != SendOutcome::Queued {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(10));
        }
        assert!(rx.poll(Duration::from_millis(500)).unwrap().is_none());
    }

    #[test]
    fn reconnects_to_a_new_producer() {
        let (sender, mut rx) = connected(4);
        let endpoint = sender.endpoint().clone();
        drop(sender);

        let deadline = Instant::now() + Duration::from_secs(5);
        let again = loop {
            match PushSender::bind(&endpoint, 4) {
                Ok(sender) => break sender,
                Err(e) => {
                    assert!(Instant::now() < deadline, "rebind failed: {e}");
                    thread::sleep(Duration::from_millis(20));
                }
            }
        };
        while again.try_send(Bytes::from_static(b"second")) != SendOutcome::Queued {
            assert!(Instant::now() < deadline, "consumer never reconnected");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(drain(&mut rx, 1), vec![Bytes::from_static(b"second")]);
    }
}
