//! Background receive worker feeding the [`FrameStore`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use flume::RecvTimeoutError;
use tracing::{debug, error, info, instrument, warn};

use super::normalize::{normalize, Normalization};
use super::store::FrameStore;
use crate::capture::DecodedFrame;
use crate::error::{BridgeError, TransportError};
use crate::protocol;
use crate::transport::{self, Endpoint, FrameSource};
use crate::{ObserverConfig, TransportConfig};

/// Lifecycle of the receive worker. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    poll_timeout: Duration,
    normalize: bool,
    accept_legacy: bool,
    log_every: u64,
}

/// Owns the transport receive handle on a dedicated thread and is the only
/// writer of its store. Construct a new observer to restart.
pub struct FrameObserver {
    store: Arc<FrameStore>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    done: flume::Receiver<()>,
    join_timeout: Duration,
}

impl FrameObserver {
    /// Connect to `transport.endpoint` and start receiving.
    #[instrument(skip_all, fields(endpoint = %transport.endpoint))]
    pub fn connect(transport: &TransportConfig, observer: &ObserverConfig) -> Result<Self, BridgeError> {
        let endpoint: Endpoint = transport.endpoint.parse()?;
        let source = transport::connect(&endpoint, transport.queue_depth, transport.max_message_bytes)?;
        Self::spawn(source, endpoint.to_string(), transport.poll_timeout(), observer)
            .map_err(BridgeError::Worker)
    }

    /// Start a worker on an already opened source.
    pub fn spawn<S>(
        source: S,
        endpoint: impl Into<String>,
        poll_timeout: Duration,
        config: &ObserverConfig,
    ) -> std::io::Result<Self>
    where
        S: FrameSource + 'static,
    {
        let store = Arc::new(FrameStore::new(endpoint));
        let shared = Arc::new(Shared {
            state: AtomicU8::new(WorkerState::Created as u8),
            stop: AtomicBool::new(false),
        });
        let settings = Settings {
            poll_timeout,
            normalize: config.normalize,
            accept_legacy: config.accept_legacy,
            log_every: config.log_every,
        };
        let (done_tx, done) = flume::bounded(1);

        let handle = thread::Builder::new().name("frame-observer".into()).spawn({
            let store = Arc::clone(&store);
            let shared = Arc::clone(&shared);
            move || {
                run_worker(source, &store, &shared, settings);
                let _ = done_tx.send(());
            }
        })?;
        shared.transition(WorkerState::Created, WorkerState::Running);
        info!(endpoint = store.endpoint(), "frame observer started");

        Ok(Self {
            store,
            shared,
            handle: Some(handle),
            done,
            join_timeout: config.join_timeout(),
        })
    }

    pub fn store(&self) -> Arc<FrameStore> {
        Arc::clone(&self.store)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Ask the worker to exit and wait at most the join timeout for it.
    ///
    /// Idempotent. A worker that does not exit in time is detached.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        self.shared.transition(WorkerState::Running, WorkerState::Stopping);

        match self.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("frame observer thread panicked");
                }
                info!("frame observer stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.join_timeout, "frame observer did not stop in time, detaching");
            }
        }
    }
}

impl Drop for FrameObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<S: FrameSource>(mut source: S, store: &FrameStore, shared: &Shared, settings: Settings) {
    shared.transition(WorkerState::Created, WorkerState::Running);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        receive_loop(&mut source, store, shared, &settings)
    }));
    match outcome {
        Ok(Ok(())) => debug!("receive loop exited"),
        Ok(Err(e)) => error!(error = %e, "receive loop failed"),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(panic = %msg, "receive loop crashed");
        }
    }

    // Closes the transport handle.
    drop(source);
    shared.state.store(WorkerState::Stopped as u8, Ordering::Release);
}

fn receive_loop<S: FrameSource>(
    source: &mut S,
    store: &FrameStore,
    shared: &Shared,
    settings: &Settings,
) -> Result<(), TransportError> {
    while !shared.stop.load(Ordering::Acquire) {
        if let Some(msg) = source.poll(settings.poll_timeout)? {
            handle_message(&msg, store, settings);
        }
    }
    Ok(())
}

fn handle_message(msg: &Bytes, store: &FrameStore, settings: &Settings) {
    let decoded = if settings.accept_legacy {
        protocol::decode(msg)
    } else {
        protocol::decode_current(msg)
    };
    let view = match decoded {
        Ok(view) => view,
        Err(e) => {
            debug!(error = %e, len = msg.len(), "dropping malformed message");
            metrics::counter!("bridge_messages_rejected", "reason" => e.reason()).increment(1);
            return;
        }
    };

    let started = Instant::now();
    let pixels = if settings.normalize {
        normalize(&view)
    } else {
        let h = &view.header;
        Normalization::IDENTITY.apply(h.width, h.height, h.channels, view.payload)
    };
    metrics::histogram!("bridge_normalize_time_us").record(started.elapsed().as_micros() as f64);

    let camera = view.header.camera;
    let total = store.publish(DecodedFrame {
        camera,
        timestamp_ns: view.header.timestamp_ns,
        pixels,
        received_at: Instant::now(),
    });
    metrics::counter!("bridge_frames_received", "camera" => camera.name()).increment(1);

    if settings.log_every > 0 && total % settings.log_every == 0 {
        info!(total, fps = %store.stats().fps_summary(), "consumer throughput");
    }
}
