//! v2 frame header codec

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{legacy, CameraChannel};
use crate::error::ProtocolError;

pub const HEADER_MAGIC: [u8; 4] = *b"ARI2";
pub const HEADER_SIZE: usize = 28;

/// Protocol generation, keyed by the magic at the start of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// `ARIA`, single implicit RGB camera.
    V1,
    /// `ARI2`, explicit camera id.
    V2,
}

impl ProtocolVersion {
    pub const fn magic(self) -> [u8; 4] {
        match self {
            ProtocolVersion::V1 => legacy::HEADER_MAGIC,
            ProtocolVersion::V2 => HEADER_MAGIC,
        }
    }

    pub const fn header_size(self) -> usize {
        match self {
            ProtocolVersion::V1 => legacy::HEADER_SIZE,
            ProtocolVersion::V2 => HEADER_SIZE,
        }
    }
}

/// Frame description that precedes the pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub camera: CameraChannel,
    /// Capture time in the producer's clock domain.
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameHeader {
    /// Number of payload bytes this header announces.
    pub fn payload_len(&self) -> Result<usize, ProtocolError> {
        payload_len(self.width, self.height, self.channels)
    }
}

/// `width * height * channels` without overflowing.
pub fn payload_len(width: u32, height: u32, channels: u32) -> Result<usize, ProtocolError> {
    let overflow = || ProtocolError::DimensionOverflow {
        width,
        height,
        channels,
    };
    let w = usize::try_from(width).map_err(|_| overflow())?;
    let h = usize::try_from(height).map_err(|_| overflow())?;
    let c = usize::try_from(channels).map_err(|_| overflow())?;
    w.checked_mul(h).and_then(|n| n.checked_mul(c)).ok_or_else(overflow)
}

/// A validated message, borrowing its payload from the receive buffer.
///
/// Nothing is copied until the normalizer produces the stored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    pub version: ProtocolVersion,
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

pub fn encode_header(header: &FrameHeader) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    let mut buf = &mut out[..];
    buf.put_slice(&HEADER_MAGIC);
    buf.put_u8(header.camera.id());
    buf.put_bytes(0, 3);
    buf.put_u64_le(header.timestamp_ns);
    buf.put_u32_le(header.width);
    buf.put_u32_le(header.height);
    buf.put_u32_le(header.channels);
    out
}

/// Build a complete v2 message: header immediately followed by `pixels`.
pub fn encode_frame(header: &FrameHeader, pixels: &[u8]) -> Result<Bytes, ProtocolError> {
    let expected = header.payload_len()?;
    if pixels.len() != expected {
        return Err(ProtocolError::SizeMismatch {
            actual: pixels.len(),
            expected,
        });
    }

    let mut msg = BytesMut::with_capacity(HEADER_SIZE + pixels.len());
    msg.put_slice(&encode_header(header));
    msg.put_slice(pixels);
    Ok(msg.freeze())
}

/// Decode and validate one message of either generation.
pub fn decode(data: &[u8]) -> Result<FrameView<'_>, ProtocolError> {
    if data.len() >= 4 && data[..4] == legacy::HEADER_MAGIC {
        return legacy::decode(data);
    }
    decode_current(data)
}

/// Decode a v2 message; `ARIA` messages are rejected as a bad magic.
pub fn decode_current(data: &[u8]) -> Result<FrameView<'_>, ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            len: data.len(),
            min: HEADER_SIZE,
        });
    }

    let mut buf = data;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != HEADER_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let camera_id = buf.get_u8();
    buf.advance(3); // reserved
    let timestamp_ns = buf.get_u64_le();
    let width = buf.get_u32_le();
    let height = buf.get_u32_le();
    let channels = buf.get_u32_le();

    let camera = CameraChannel::from_id(camera_id).ok_or(ProtocolError::UnknownCamera(camera_id))?;
    let header = FrameHeader {
        camera,
        timestamp_ns,
        width,
        height,
        channels,
    };

    let payload = checked_payload(data, HEADER_SIZE, &header)?;
    Ok(FrameView {
        version: ProtocolVersion::V2,
        header,
        payload,
    })
}

/// Slice out the payload after checking the total length matches the header.
pub(crate) fn checked_payload<'a>(
    data: &'a [u8],
    header_size: usize,
    header: &FrameHeader,
) -> Result<&'a [u8], ProtocolError> {
    let expected = header
        .payload_len()?
        .checked_add(header_size)
        .ok_or(ProtocolError::DimensionOverflow {
            width: header.width,
            height: header.height,
            channels: header.channels,
        })?;
    if data.len() != expected {
        return Err(ProtocolError::SizeMismatch {
            actual: data.len(),
            expected,
        });
    }
    Ok(&data[header_size..])
}
