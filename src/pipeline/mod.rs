//! Consumer side: normalization and the latest-frame-per-camera store.

pub mod normalize;
pub mod observer;
pub mod store;

pub use normalize::{normalize, ChannelOp, Normalization, Rotation};
pub use observer::{FrameObserver, WorkerState};
pub use store::{FrameStore, StoreStats};
