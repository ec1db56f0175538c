//! Latest-frame-per-camera cache.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::{DecodedFrame, PixelGrid};
use crate::protocol::CameraChannel;

pub const STATS_SOURCE: &str = "aria-bridge";

#[derive(Default)]
struct Slots {
    frames: [Option<DecodedFrame>; CameraChannel::COUNT],
    counts: [u64; CameraChannel::COUNT],
    total: u64,
}

/// Written by the receive worker only, read from anywhere.
///
/// A frame and its counter are replaced under one write lock, so readers
/// never see a half-published frame.
pub struct FrameStore {
    slots: RwLock<Slots>,
    started: Instant,
    endpoint: String,
}

/// Snapshot returned by [`FrameStore::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub source: &'static str,
    /// Validated frames per camera, zero included.
    pub frames: BTreeMap<CameraChannel, u64>,
    /// Average rate since start, only for cameras that produced frames.
    pub fps: BTreeMap<CameraChannel, f64>,
    pub uptime_secs: f64,
    pub endpoint: String,
}

impl StoreStats {
    pub fn total_frames(&self) -> u64 {
        self.frames.values().sum()
    }

    /// `rgb=11.0 eye=30.0` style summary for logs.
    pub fn fps_summary(&self) -> String {
        self.fps
            .iter()
            .map(|(cam, fps)| format!("{cam}={fps:.1}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FrameStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            started: Instant::now(),
            endpoint: endpoint.into(),
        }
    }

    // A panicking writer must not take readers down with it: the slots are
    // only ever replaced wholesale, so a poisoned lock still holds whole frames.
    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the camera's frame and bump its counter. Returns the number of
    /// frames stored so far across all cameras.
    pub(crate) fn publish(&self, frame: DecodedFrame) -> u64 {
        let idx = frame.camera.index();
        let mut slots = self.write();
        slots.frames[idx] = Some(frame);
        slots.counts[idx] += 1;
        slots.total += 1;
        slots.total
    }

    /// Pixels of the latest frame, `None` until the camera delivered one.
    ///
    /// The returned grid is immutable; later frames never alter it.
    pub fn get_frame(&self, camera: CameraChannel) -> Option<PixelGrid> {
        self.read().frames[camera.index()]
            .as_ref()
            .map(|frame| frame.pixels.clone())
    }

    pub fn get_latest(&self, camera: CameraChannel) -> Option<DecodedFrame> {
        self.read().frames[camera.index()].clone()
    }

    pub fn frame_count(&self, camera: CameraChannel) -> u64 {
        self.read().counts[camera.index()]
    }

    pub fn total_frames(&self) -> u64 {
        self.read().total
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn stats(&self) -> StoreStats {
        let counts = self.read().counts;
        let uptime = self.uptime().as_secs_f64();

        let frames = CameraChannel::ALL
            .iter()
            .map(|cam| (*cam, counts[cam.index()]))
            .collect::<BTreeMap<_, _>>();
        let fps = frames
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(cam, count)| (*cam, *count as f64 / uptime.max(f64::EPSILON)))
            .collect();

        StoreStats {
            source: STATS_SOURCE,
            frames,
            fps,
            uptime_secs: uptime,
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use bytes::Bytes;

    use super::*;

    fn frame(camera: CameraChannel, value: u8) -> DecodedFrame {
        DecodedFrame {
            camera,
            timestamp_ns: value as u64,
            pixels: PixelGrid::new(Bytes::from(vec![value; 12]), 2, 2, 3).unwrap(),
            received_at: Instant::now(),
        }
    }

    #[test]
    fn starts_empty() {
        let store = FrameStore::new("tcp://127.0.0.1:5555");
        for cam in CameraChannel::ALL {
            assert!(store.get_frame(cam).is_none());
            assert!(store.get_latest(cam).is_none());
            assert_eq!(store.frame_count(cam), 0);
        }
        let stats = store.stats();
        assert_eq!(stats.source, "aria-bridge");
        assert_eq!(stats.total_frames(), 0);
        assert!(stats.fps.is_empty());
        assert_eq!(stats.endpoint, "tcp://127.0.0.1:5555");
    }

    #[test]
    fn latest_frame_replaces_previous() {
        let store = FrameStore::new("test");
        assert_eq!(store.publish(frame(CameraChannel::Rgb, 1)), 1);
        assert_eq!(store.publish(frame(CameraChannel::Rgb, 2)), 2);

        let latest = store.get_latest(CameraChannel::Rgb).unwrap();
        assert_eq!(latest.timestamp_ns, 2);
        assert!(latest.pixels.as_bytes().iter().all(|v| *v == 2));
        assert_eq!(store.frame_count(CameraChannel::Rgb), 2);
        assert!(store.get_frame(CameraChannel::Eye).is_none());
    }

    #[test]
    fn handed_out_frames_are_not_mutated() {
        let store = FrameStore::new("test");
        store.publish(frame(CameraChannel::Slam1, 10));
        let held = store.get_frame(CameraChannel::Slam1).unwrap();
        store.publish(frame(CameraChannel::Slam1, 20));
        assert!(held.as_bytes().iter().all(|v| *v == 10));
    }

    #[test]
    fn fps_only_for_active_cameras() {
        let store = FrameStore::new("test");
        store.publish(frame(CameraChannel::Eye, 1));
        thread::sleep(Duration::from_millis(10));
        let stats = store.stats();
        assert_eq!(stats.frames[&CameraChannel::Eye], 1);
        assert_eq!(stats.frames[&CameraChannel::Rgb], 0);
        assert!(stats.fps.contains_key(&CameraChannel::Eye));
        assert!(!stats.fps.contains_key(&CameraChannel::Rgb));
        assert!(stats.fps[&CameraChannel::Eye] > 0.0);
        assert!(stats.fps_summary().starts_with("eye="));
    }

    #[test]
    fn concurrent_readers_see_whole_frames() {
        let store = Arc::new(FrameStore::new("test"));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500u32 {
                    store.publish(frame(CameraChannel::Rgb, (i % 256) as u8));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut last_count = 0;
                    for _ in 0..500 {
                        if let Some(grid) = store.get_frame(CameraChannel::Rgb) {
                            let first = grid.as_bytes()[0];
                            assert!(grid.as_bytes().iter().all(|v| *v == first));
                        }
                        let count = store.frame_count(CameraChannel::Rgb);
                        assert!(count >= last_count);
                        last_count = count;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.frame_count(CameraChannel::Rgb), 500);
    }

    #[test]
    fn reads_survive_a_poisoned_lock() {
        let store = Arc::new(FrameStore::new("test"));
        store.publish(frame(CameraChannel::Rgb, 3));
        let poisoner = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write();
            panic!("writer crashed");
        })
        .join();

        assert!(store.slots.is_poisoned());
        assert_eq!(store.get_latest(CameraChannel::Rgb).unwrap().timestamp_ns, 3);
    }

    #[test]
    fn stats_serialize() {
        let store = FrameStore::new("tcp://127.0.0.1:5555");
        store.publish(frame(CameraChannel::Slam2, 1));
        let json = serde_json::to_value(store.stats()).unwrap();
        assert_eq!(json["frames"]["slam2"], 1);
        assert_eq!(json["source"], "aria-bridge");
    }
}
