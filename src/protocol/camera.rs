use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical capture channels carried by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraChannel {
    Rgb,
    Eye,
    Slam1,
    Slam2,
}

impl CameraChannel {
    pub const ALL: [CameraChannel; 4] = [
        CameraChannel::Rgb,
        CameraChannel::Eye,
        CameraChannel::Slam1,
        CameraChannel::Slam2,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Id written into the v2 header.
    pub const fn id(self) -> u8 {
        match self {
            CameraChannel::Rgb => 0,
            CameraChannel::Eye => 1,
            CameraChannel::Slam1 => 2,
            CameraChannel::Slam2 => 3,
        }
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CameraChannel::Rgb),
            1 => Some(CameraChannel::Eye),
            2 => Some(CameraChannel::Slam1),
            3 => Some(CameraChannel::Slam2),
            _ => None,
        }
    }

    /// Slot index into per-camera tables.
    pub const fn index(self) -> usize {
        self.id() as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            CameraChannel::Rgb => "rgb",
            CameraChannel::Eye => "eye",
            CameraChannel::Slam1 => "slam1",
            CameraChannel::Slam2 => "slam2",
        }
    }

    /// Map a vendor stream label (e.g. `"CameraId.Slam1"`) onto a channel.
    ///
    /// Labels that name no known sensor fall back to the RGB camera, the only
    /// stream subscribed by default.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("slam1") {
            CameraChannel::Slam1
        } else if label.contains("slam2") {
            CameraChannel::Slam2
        } else if label.contains("eye") {
            CameraChannel::Eye
        } else {
            CameraChannel::Rgb
        }
    }
}

impl fmt::Display for CameraChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCameraName(pub String);

impl fmt::Display for UnknownCameraName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown camera {:?}", self.0)
    }
}

impl std::error::Error for UnknownCameraName {}

impl FromStr for CameraChannel {
    type Err = UnknownCameraName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CameraChannel::ALL
            .into_iter()
            .find(|cam| cam.name() == s)
            .ok_or_else(|| UnknownCameraName(s.to_owned()))
    }
}
