//! Frame decoding and read-ahead buffering.

pub mod decoder;
pub mod frame_lens;
pub mod read_ahead;

pub use decoder::{DecodeError, FrameDecoder, FrameImage, ImageFrameDecoder, VideoFrame};
pub use frame_lens::{FrameLens, LensParams, SharedLensParams};
pub use read_ahead::{BufferError, Producer, ReadAheadBuffer, DEFAULT_CAPACITY};
