//! Orientation and colorspace normalization.
//!
//! Output convention: top-left origin, sensor mounting compensated,
//! 3-channel B,G,R samples, contiguous row-major storage.

use bytes::Bytes;

use crate::capture::PixelGrid;
use crate::protocol::{CameraChannel, FrameView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    /// 90 degrees clockwise.
    Clockwise90,
    Half,
}

impl Rotation {
    /// `(width, height)` after rotating a `width x height` grid.
    pub fn output_dims(self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Rotation::None | Rotation::Half => (width, height),
            Rotation::Clockwise90 => (height, width),
        }
    }

    /// Source `(row, col)` for output pixel `(row, col)` of a `width x height` input.
    #[inline]
    fn source(self, row: usize, col: usize, width: usize, height: usize) -> (usize, usize) {
        match self {
            Rotation::None => (row, col),
            Rotation::Clockwise90 => (height - 1 - col, row),
            Rotation::Half => (height - 1 - row, width - 1 - col),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOp {
    Keep,
    /// Reverse sample order (R,G,B -> B,G,R). Single-channel input is
    /// replicated instead, there is no order to reverse.
    Reverse,
    /// Replicate single-channel input into three identical channels.
    ExpandGray,
}

impl ChannelOp {
    pub fn output_channels(self, channels: usize) -> usize {
        match self {
            ChannelOp::Keep => channels,
            ChannelOp::Reverse | ChannelOp::ExpandGray if channels == 1 => 3,
            ChannelOp::Reverse | ChannelOp::ExpandGray => channels,
        }
    }

    #[inline]
    fn write(self, px: &[u8], out: &mut Vec<u8>) {
        match (self, px) {
            (ChannelOp::Reverse | ChannelOp::ExpandGray, &[gray]) => out.extend_from_slice(&[gray; 3]),
            (ChannelOp::Reverse, _) => out.extend(px.iter().rev()),
            (ChannelOp::Keep | ChannelOp::ExpandGray, _) => out.extend_from_slice(px),
        }
    }
}

/// Per-camera transform applied once to every validated payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalization {
    pub rotation: Rotation,
    pub channels: ChannelOp,
}

impl Normalization {
    pub const IDENTITY: Normalization = Normalization {
        rotation: Rotation::None,
        channels: ChannelOp::Keep,
    };

    pub const fn for_camera(camera: CameraChannel) -> Self {
        match camera {
            CameraChannel::Rgb => Normalization {
                rotation: Rotation::Clockwise90,
                channels: ChannelOp::Reverse,
            },
            CameraChannel::Eye => Normalization {
                rotation: Rotation::Half,
                channels: ChannelOp::ExpandGray,
            },
            CameraChannel::Slam1 | CameraChannel::Slam2 => Normalization {
                rotation: Rotation::Clockwise90,
                channels: ChannelOp::ExpandGray,
            },
        }
    }

    /// Transform a `height x width x channels` row-major buffer.
    ///
    /// `src.len()` must equal `width * height * channels`.
    pub fn apply(&self, width: u32, height: u32, channels: u32, src: &[u8]) -> PixelGrid {
        let (w, h, c) = (width as usize, height as usize, channels as usize);
        debug_assert_eq!(src.len(), w * h * c);

        if *self == Self::IDENTITY {
            return PixelGrid::from_parts(Bytes::copy_from_slice(src), width, height, channels);
        }

        let (out_w, out_h) = self.rotation.output_dims(w, h);
        let out_c = self.channels.output_channels(c);
        let mut out = Vec::with_capacity(out_w * out_h * out_c);

        for row in 0..out_h {
            for col in 0..out_w {
                let (sr, sc) = self.rotation.source(row, col, w, h);
                let start = (sr * w + sc) * c;
                self.channels.write(&src[start..start + c], &mut out);
            }
        }

        PixelGrid::from_parts(Bytes::from(out), out_w as u32, out_h as u32, out_c as u32)
    }
}

/// Normalize a decoded message according to its camera.
pub fn normalize(view: &FrameView<'_>) -> PixelGrid {
    let h = &view.header;
    Normalization::for_camera(h.camera).apply(h.width, h.height, h.channels, view.payload)
}
