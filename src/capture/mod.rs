pub mod emitter;
pub mod frame;

pub use emitter::FrameEmitter;
pub use frame::{DecodedFrame, Image, PixelGrid};
