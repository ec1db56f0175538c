use std::time::Instant;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::protocol::header::payload_len;
use crate::protocol::CameraChannel;

/// Contiguous row-major `height x width x channels` grid of `u8` samples.
///
/// The buffer is immutable and reference counted: clones handed to readers
/// share storage but can never be mutated underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    data: Bytes,
    width: u32,
    height: u32,
    channels: u32,
}

impl PixelGrid {
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<Self, ProtocolError> {
        let data = data.into();
        let expected = payload_len(width, height, channels)?;
        if data.len() != expected {
            return Err(ProtocolError::SizeMismatch {
                actual: data.len(),
                expected,
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Caller guarantees `data.len() == width * height * channels`.
    pub(crate) fn from_parts(data: Bytes, width: u32, height: u32, channels: u32) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels as usize);
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// `(rows, cols, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Samples of the pixel at `(row, col)`.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[u8]> {
        let (rows, cols, channels) = self.shape();
        if row >= rows || col >= cols {
            return None;
        }
        let start = (row * cols + col) * channels;
        Some(&self.data[start..start + channels])
    }
}

/// Latest normalized frame for one camera.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub camera: CameraChannel,
    pub timestamp_ns: u64,
    pub pixels: PixelGrid,
    /// When the consumer stored the frame.
    pub received_at: Instant,
}

/// Borrowed producer-side image as handed over by the capture SDK.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: &'a [u8],
}

impl<'a> Image<'a> {
    pub fn new(width: u32, height: u32, channels: u32, data: &'a [u8]) -> Result<Self, ProtocolError> {
        let expected = payload_len(width, height, channels)?;
        if data.len() != expected {
            return Err(ProtocolError::SizeMismatch {
                actual: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_checks_length() {
        assert!(PixelGrid::new(vec![0u8; 12], 2, 2, 3).is_ok());
        assert_eq!(
            PixelGrid::new(vec![0u8; 11], 2, 2, 3),
            Err(ProtocolError::SizeMismatch {
                actual: 11,
                expected: 12
            })
        );
    }

    #[test]
    fn pixel_addressing_is_row_major() {
        let grid = PixelGrid::new((0u8..18).collect::<Vec<_>>(), 3, 2, 3).unwrap();
        assert_eq!(grid.shape(), (2, 3, 3));
        assert_eq!(grid.pixel(0, 0), Some(&[0, 1, 2][..]));
        assert_eq!(grid.pixel(1, 2), Some(&[15, 16, 17][..]));
        assert_eq!(grid.pixel(2, 0), None);
    }

    #[test]
    fn image_checks_length() {
        assert!(Image::new(2, 2, 1, &[0; 4]).is_ok());
        assert!(Image::new(2, 2, 1, &[0; 5]).is_err());
    }
}
