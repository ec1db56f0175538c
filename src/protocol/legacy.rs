//! Compatibility shim for the v1 (`ARIA`) header.
//!
//! v1 predates multi-camera support: 24 bytes, no camera id, no padding.
//! Every v1 frame is attributed to the RGB camera.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::header::{checked_payload, FrameHeader, FrameView, ProtocolVersion};
use super::CameraChannel;
use crate::error::ProtocolError;

pub const HEADER_MAGIC: [u8; 4] = *b"ARIA";
pub const HEADER_SIZE: usize = 24;

pub fn encode_frame(
    timestamp_ns: u64,
    width: u32,
    height: u32,
    channels: u32,
    pixels: &[u8],
) -> Result<Bytes, ProtocolError> {
    let header = FrameHeader {
        camera: CameraChannel::Rgb,
        timestamp_ns,
        width,
        height,
        channels,
    };
    let expected = header.payload_len()?;
    if pixels.len() != expected {
        return Err(ProtocolError::SizeMismatch {
            actual: pixels.len(),
            expected,
        });
    }

    let mut msg = BytesMut::with_capacity(HEADER_SIZE + pixels.len());
    msg.put_slice(&HEADER_MAGIC);
    msg.put_u64_le(timestamp_ns);
    msg.put_u32_le(width);
    msg.put_u32_le(height);
    msg.put_u32_le(channels);
    msg.put_slice(pixels);
    Ok(msg.freeze())
}

pub fn decode(data: &[u8]) -> Result<FrameView<'_>, ProtocolError> {
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

    let header = FrameHeader {
        camera: CameraChannel::Rgb,
        timestamp_ns: buf.get_u64_le(),
        width: buf.get_u32_le(),
        height: buf.get_u32_le(),
        channels: buf.get_u32_le(),
    };

    let payload = checked_payload(data, HEADER_SIZE, &header)?;
    Ok(FrameView {
        version: ProtocolVersion::V1,
        header,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_has_no_camera_or_padding() {
        let msg = encode_frame(42, 2, 1, 3, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(msg.len(), HEADER_SIZE + 6);
        assert_eq!(&msg[..4], b"ARIA");
        assert_eq!(&msg[4..12], &42u64.to_le_bytes());
        assert_eq!(&msg[12..16], &2u32.to_le_bytes());
        assert_eq!(&msg[HEADER_SIZE..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn decodes_as_rgb() {
        let msg = encode_frame(7, 2, 2, 1, &[10, 20, 30, 40]).unwrap();
        let view = decode(&msg).unwrap();
        assert_eq!(view.version, ProtocolVersion::V1);
        assert_eq!(view.header.camera, CameraChannel::Rgb);
        assert_eq!(view.header.timestamp_ns, 7);
        assert_eq!(view.payload, &[10, 20, 30, 40]);
    }

    #[test]
    fn rejects_size_mismatch() {
        let msg = encode_frame(7, 2, 2, 1, &[10, 20, 30, 40]).unwrap();
        assert_eq!(
            decode(&msg[..HEADER_SIZE + 3]),
            Err(ProtocolError::SizeMismatch {
                actual: HEADER_SIZE + 3,
                expected: HEADER_SIZE + 4
            })
        );
        assert!(matches!(
            decode(&msg[..10]),
            Err(ProtocolError::Truncated { len: 10, min: HEADER_SIZE })
        ));
    }
}
