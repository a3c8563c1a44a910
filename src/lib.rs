//! Frame-sequence media player core.
//!
//! Plays directories of numbered image frames in step with numbered WAV
//! tracks, and directories of numbered songs as a playlist.

pub mod audio;
pub mod clock;
pub mod config;
pub mod core;
pub mod decode;
pub mod playback;
pub mod render;

pub use config::PlayerConfig;
pub use playback::{FrameSequenceWorker, MusicPlaylistWorker, SequenceWorker, WorkerContext};
