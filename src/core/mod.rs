//! Core types for the player.
//!
//! This module provides the frame timeline abstraction and the time-code
//! helpers used for status readouts.

pub mod sequence;
pub mod time;

// Re-export core data structures for easier access.
pub use sequence::{FileFrameSequence, FrameSequence, SequenceCursor, SequenceError};
pub use time::{format_minutes, format_time_code, Seconds, MAX_SECONDS};
