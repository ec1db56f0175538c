//! Wire protocol shared by the producer and the consumer.
//!
//! Every message is one header followed by `width * height * channels` raw
//! `u8` samples, little-endian, no trailer. Two generations exist:
//! - v2 (`ARI2`, 28 bytes): explicit camera id plus 3 reserved bytes
//! - v1 (`ARIA`, 24 bytes): single implicit camera, see [`legacy`]

pub mod camera;
pub mod header;
pub mod legacy;

pub use camera::CameraChannel;
pub use header::{
    decode, decode_current, encode_frame, encode_header, payload_len, FrameHeader, FrameView,
    ProtocolVersion, HEADER_MAGIC, HEADER_SIZE,
};
