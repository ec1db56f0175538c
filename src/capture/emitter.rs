//! Producer-side "serialize and send" step.
//!
//! The capture SDK pushes images through a callback; the producer turns each
//! one into a single wire message and hands it to the transport without ever
//! blocking the callback.

use std::time::Instant;

use tracing::{debug, info, trace};

use super::Image;
use crate::error::ProtocolError;
use crate::protocol::{self, legacy, CameraChannel, FrameHeader, ProtocolVersion};
use crate::transport::{FrameSink, SendOutcome};

const LOG_EVERY: u64 = 90;

pub struct FrameEmitter<S> {
    sink: S,
    version: ProtocolVersion,
    sent: [u64; CameraChannel::COUNT],
    dropped: u64,
    started: Instant,
    first_frame: bool,
}

impl<S: FrameSink> FrameEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            version: ProtocolVersion::V2,
            sent: [0; CameraChannel::COUNT],
            dropped: 0,
            started: Instant::now(),
            first_frame: true,
        }
    }

    /// Emit the given protocol generation. v1 cannot carry a camera id, every
    /// frame is read back as RGB.
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Encode one captured image and queue it without blocking.
    ///
    /// A full queue is not an error: the frame is dropped and only shows up
    /// as a gap in the consumer's counts.
    pub fn emit(
        &mut self,
        camera: CameraChannel,
        timestamp_ns: u64,
        image: &Image<'_>,
    ) -> Result<SendOutcome, ProtocolError> {
        let msg = match self.version {
            ProtocolVersion::V2 => {
                let header = FrameHeader {
                    camera,
                    timestamp_ns,
                    width: image.width,
                    height: image.height,
                    channels: image.channels,
                };
                protocol::encode_frame(&header, image.data)?
            }
            ProtocolVersion::V1 => {
                legacy::encode_frame(timestamp_ns, image.width, image.height, image.channels, image.data)?
            }
        };

        if self.first_frame {
            self.first_frame = false;
            info!(
                %camera,
                width = image.width,
                height = image.height,
                channels = image.channels,
                bytes = msg.len(),
                "first frame"
            );
        }

        let outcome = self.sink.try_send(msg);
        match outcome {
            SendOutcome::Queued => {
                self.sent[camera.index()] += 1;
                metrics::counter!("bridge_frames_sent", "camera" => camera.name()).increment(1);
                let total = self.total_sent();
                if total % LOG_EVERY == 0 {
                    info!(total, fps = %self.fps_summary(), "producer throughput");
                }
            }
            SendOutcome::Dropped => {
                self.dropped += 1;
                metrics::counter!("bridge_frames_dropped").increment(1);
                trace!(%camera, "consumer too slow, frame dropped");
            }
            SendOutcome::Disconnected => debug!(%camera, "transport closed, frame discarded"),
        }
        Ok(outcome)
    }

    pub fn sent(&self, camera: CameraChannel) -> u64 {
        self.sent[camera.index()]
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.iter().sum()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn fps_summary(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        CameraChannel::ALL
            .iter()
            .filter(|cam| self.sent[cam.index()] > 0)
            .map(|cam| format!("{}={:.0}", cam, self.sent[cam.index()] as f64 / elapsed))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
