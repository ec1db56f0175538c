//! Launch the producer and the local receive worker as one unit.
//!
//! ```no_run
//! use std::time::Duration;
//! use aria_bridge::{Bridge, BridgeConfig, CameraChannel};
//!
//! let mut bridge = Bridge::new(BridgeConfig::default())?;
//! bridge.start(Duration::from_secs(15))?;
//! while bridge.is_running() {
//!     if let Some(frame) = bridge.get_frame(CameraChannel::Rgb) {
//!         println!("{:?}", frame.shape());
//!     }
//! }
//! bridge.stop();
//! # Ok::<(), aria_bridge::BridgeError>(())
//! ```

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::capture::{DecodedFrame, PixelGrid};
use crate::error::BridgeError;
use crate::pipeline::{FrameObserver, FrameStore, StoreStats};
use crate::protocol::CameraChannel;
use crate::transport::Endpoint;
use crate::utils;
use crate::{BridgeConfig, Interface};

/// How `start` concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A frame was stored.
    Ready,
    /// Timed out with the producer still alive; usable but unconfirmed.
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub producer_pid: Option<u32>,
    pub interface: Interface,
    pub profile: String,
}

pub struct Bridge {
    config: BridgeConfig,
    endpoint: Endpoint,
    producer: Option<Child>,
    observer: Option<FrameObserver>,
    /// Survives `stop` so the last frames stay readable.
    store: Option<Arc<FrameStore>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let endpoint = config.transport.endpoint()?;
        Ok(Self {
            config,
            endpoint,
            producer: None,
            observer: None,
            store: None,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Launch the producer, start receiving, and wait for the first frame.
    ///
    /// Fails if the producer exits before any frame arrives. If `timeout`
    /// elapses while it is still alive, returns [`StartOutcome::Unconfirmed`].
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub fn start(&mut self, timeout: Duration) -> Result<StartOutcome, BridgeError> {
        if self.producer.is_some() || self.observer.is_some() {
            return Err(BridgeError::AlreadyStarted);
        }

        let mut command = self.producer_command()?;
        let mut child = command.spawn().map_err(BridgeError::Spawn)?;
        info!(pid = child.id(), interface = self.config.producer.interface.as_str(), "producer launched");

        let observer = match FrameObserver::connect(&self.config.transport, &self.config.observer) {
            Ok(observer) => observer,
            Err(e) => {
                utils::terminate_process(&mut child, self.config.lifecycle.term_grace());
                return Err(e);
            }
        };
        let store = observer.store();
        self.store = Some(Arc::clone(&store));
        self.observer = Some(observer);
        self.producer = Some(child);

        let poll = self.config.lifecycle.ready_poll();
        let deadline = Instant::now() + timeout;
        loop {
            if store.total_frames() > 0 {
                info!("first frame received, bridge ready");
                return Ok(StartOutcome::Ready);
            }
            if let Some(status) = self.producer_exit_status() {
                warn!(%status, "producer exited before the first frame");
                if let Some(mut observer) = self.observer.take() {
                    observer.stop();
                }
                self.producer = None;
                return Err(BridgeError::ProducerExited(status));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(poll));
        }

        warn!(?timeout, "no frames received within timeout, but producer is still running");
        Ok(StartOutcome::Unconfirmed)
    }

    /// Stop the worker, then terminate the producer. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(mut observer) = self.observer.take() {
            observer.stop();
        }
        if let Some(mut child) = self.producer.take() {
            utils::terminate_process(&mut child, self.config.lifecycle.term_grace());
        }
    }

    /// Producer process alive and receive worker running.
    pub fn is_running(&mut self) -> bool {
        let producer_alive = match self.producer.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | None => false,
            Some(Err(e)) => {
                warn!(error = %e, "failed to query producer status");
                false
            }
        };
        producer_alive && self.observer.as_ref().is_some_and(FrameObserver::is_running)
    }

    pub fn get_frame(&self, camera: CameraChannel) -> Option<PixelGrid> {
        self.store.as_ref()?.get_frame(camera)
    }

    pub fn get_latest(&self, camera: CameraChannel) -> Option<DecodedFrame> {
        self.store.as_ref()?.get_latest(camera)
    }

    pub fn get_stats(&self) -> Option<BridgeStats> {
        let store = self.store.as_ref()?;
        Some(BridgeStats {
            store: store.stats(),
            producer_pid: self.producer.as_ref().map(Child::id),
            interface: self.config.producer.interface,
            profile: self.config.producer.profile.clone(),
        })
    }

    /// Shared handle for readers on other threads.
    pub fn store(&self) -> Option<Arc<FrameStore>> {
        self.store.clone()
    }

    fn producer_exit_status(&mut self) -> Option<std::process::ExitStatus> {
        match self.producer.as_mut()?.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "failed to query producer status");
                None
            }
        }
    }

    /// Producer command line: configured args, then the contract arguments.
    fn producer_command(&self) -> Result<Command, BridgeError> {
        let producer = &self.config.producer;
        let endpoint = self.endpoint.to_string();

        let mut args: Vec<&str> = producer.args.iter().map(String::as_str).collect();
        args.extend([
            "--interface",
            producer.interface.as_str(),
            "--zmq-endpoint",
            endpoint.as_str(),
            "--profile",
            producer.profile.as_str(),
        ]);
        if let Some(address) = producer.device_address.as_deref() {
            args.extend(["--device-ip", address]);
        }

        let mut command = match producer.wrapper.as_deref() {
            Some(wrapper) => {
                let launcher = utils::find_on_path(wrapper)
                    .ok_or_else(|| BridgeError::LauncherNotFound(wrapper.to_owned()))?;
                let line = utils::shell_join(std::iter::once(producer.program.as_str()).chain(args));
                let mut command = Command::new(launcher);
                command.arg("-c").arg(line);
                command
            }
            None => {
                let mut command = Command::new(&producer.program);
                command.args(args);
                command
            }
        };

        for entry in &producer.env {
            if let Some((key, value)) = entry.split_once('=') {
                command.env(key, value);
            }
        }
        command.stdin(Stdio::null());
        Ok(command)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
