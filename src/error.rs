use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Validation failures raised while decoding or encoding a frame message.
///
/// Decode failures are recoverable: the receive loop drops the message and
/// keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message too short: {len} bytes, header needs {min}")]
    Truncated { len: usize, min: usize },
    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),
    #[error("unknown camera id {0}")]
    UnknownCamera(u8),
    #[error("size mismatch: got {actual} bytes, expected {expected}")]
    SizeMismatch { actual: usize, expected: usize },
    #[error("frame dimensions {width}x{height}x{channels} overflow the address space")]
    DimensionOverflow {
        width: u32,
        height: u32,
        channels: u32,
    },
}

impl ProtocolError {
    /// Stable label used for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::Truncated { .. } => "truncated",
            ProtocolError::BadMagic(_) => "bad_magic",
            ProtocolError::UnknownCamera(_) => "unknown_camera",
            ProtocolError::SizeMismatch { .. } => "size_mismatch",
            ProtocolError::DimensionOverflow { .. } => "overflow",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {0:?}: expected scheme://host:port")]
    InvalidEndpoint(String),
    #[error("unsupported transport scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("message queue error: {0}")]
    Queue(#[from] zmq::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge already started")]
    AlreadyStarted,
    #[error("launcher {0:?} not found on PATH")]
    LauncherNotFound(String),
    #[error("failed to spawn producer: {0}")]
    Spawn(#[source] io::Error),
    #[error("producer exited before the first frame ({0})")]
    ProducerExited(ExitStatus),
    #[error("failed to spawn receive worker: {0}")]
    Worker(#[source] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
