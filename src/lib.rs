pub mod bridge;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod transport;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use bridge::{Bridge, BridgeStats, StartOutcome};
pub use capture::{DecodedFrame, FrameEmitter, Image, PixelGrid};
pub use error::{BridgeError, ConfigError, ProtocolError, TransportError};
pub use pipeline::{FrameObserver, FrameStore, StoreStats, WorkerState};
pub use protocol::CameraChannel;

use crate::transport::{Endpoint, DEFAULT_ENDPOINT, DEFAULT_MAX_MESSAGE_BYTES};

/// Streaming profile tuned for throughput under emulation (~11 FPS RGB).
pub const PROFILE_STREAMING: &str = "profile12";

/// Environment prefix for overrides, e.g. `ARIA_BRIDGE__TRANSPORT__ENDPOINT`.
pub const ENV_PREFIX: &str = "ARIA_BRIDGE";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub producer: ProducerConfig,
    pub transport: TransportConfig,
    pub observer: ObserverConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Usb,
    Wifi,
}

impl Interface {
    pub const fn as_str(self) -> &'static str {
        match self {
            Interface::Usb => "usb",
            Interface::Wifi => "wifi",
        }
    }
}

/// How to launch the frame producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub interface: Interface,
    /// Device IP, required for wifi.
    pub device_address: Option<String>,
    pub profile: String,
    pub program: String,
    /// Arguments placed before the producer contract arguments.
    pub args: Vec<String>,
    /// Shell-like launcher (e.g. the emulator's `FEXBash`); the producer
    /// command line is passed to it as `-c "<cmd>"`.
    pub wrapper: Option<String>,
    /// Extra environment as `KEY=VALUE`.
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint: String,
    /// Messages each end may hold (ZeroMQ high-water mark) before the
    /// producer drops new frames.
    pub queue_depth: usize,
    pub poll_timeout_ms: u64,
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Rotate and reorder channels into the downstream convention.
    pub normalize: bool,
    /// Also accept v1 (`ARIA`) messages.
    pub accept_legacy: bool,
    /// Throughput log interval in frames; 0 disables it.
    pub log_every: u64,
    pub join_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub start_timeout_ms: u64,
    pub ready_poll_ms: u64,
    /// Wait after SIGTERM before the producer is killed.
    pub term_grace_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interface: Interface::Usb,
            device_address: None,
            profile: PROFILE_STREAMING.into(),
            program: "python3".into(),
            args: vec!["aria_receiver.py".into()],
            wrapper: Some("FEXBash".into()),
            env: vec!["PYTHONNOUSERSITE=1".into()],
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            queue_depth: 2,
            poll_timeout_ms: 100,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            accept_legacy: true,
            log_every: 300,
            join_timeout_ms: 2_000,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 15_000,
            ready_poll_ms: 200,
            term_grace_ms: 5_000,
        }
    }
}

impl TransportConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn endpoint(&self) -> Result<Endpoint, TransportError> {
        self.endpoint.parse()
    }
}

impl ObserverConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl LifecycleConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_millis(self.term_grace_ms)
    }
}

impl BridgeConfig {
    /// Defaults, then the optional TOML file, then `ARIA_BRIDGE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&BridgeConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let producer = &self.producer;
        if producer.interface == Interface::Wifi
            && producer.device_address.as_deref().map_or(true, str::is_empty)
        {
            return invalid("producer.device_address is required for the wifi interface".into());
        }
        if producer.program.is_empty() {
            return invalid("producer.program must not be empty".into());
        }
        if let Some(entry) = producer.env.iter().find(|kv| !kv.contains('=')) {
            return invalid(format!("producer.env entry {entry:?} is not KEY=VALUE"));
        }

        if let Err(e) = self.transport.endpoint() {
            return invalid(format!("transport.endpoint: {e}"));
        }
        if self.transport.queue_depth == 0 {
            return invalid("transport.queue_depth must be at least 1".into());
        }
        if self.transport.poll_timeout_ms == 0 {
            return invalid("transport.poll_timeout_ms must be positive".into());
        }
        if self.lifecycle.ready_poll_ms == 0 {
            return invalid("lifecycle.ready_poll_ms must be positive".into());
        }
        Ok(())
    }
}
