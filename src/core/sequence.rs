//! Bounded frame timelines.
//!
//! A [`SequenceCursor`] is an inclusive `[start, end]` range of frame numbers
//! with a current point and a signed per-tick step ("skip"). Negative skips
//! play in reverse, magnitudes above one scan. [`FrameSequence`] adds the
//! projection size of the frames and [`FileFrameSequence`] adds the file
//! extension used to resolve one image file per frame.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Error raised when a sequence is constructed from invalid parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("end frame {end} must be greater than start frame {start}")]
    EmptyRange { start: i32, end: i32 },
    #[error("frame rate must be positive")]
    NonPositiveRate,
    #[error("projection size {width}x{height} must be positive")]
    NonPositiveDimension { width: i32, height: i32 },
}

/// Position and step over an inclusive range of frame numbers
#[derive(Debug, Clone)]
pub struct SequenceCursor {
    name: String,
    start: i32,
    end: i32,
    rate: u32,
    point: i32,
    skip: i32,
}

impl SequenceCursor {
    /// Create a cursor parked at `start`, playing forward one frame per tick
    pub fn new(name: impl Into<String>, start: i32, end: i32, rate: u32) -> Self {
        Self::with_state(name, start, end, rate, 1, start)
    }

    /// Create a cursor with an explicit skip and point
    pub fn with_state(
        name: impl Into<String>,
        start: i32,
        end: i32,
        rate: u32,
        skip: i32,
        point: i32,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            rate,
            point,
            skip,
        }
    }

    /// Copy of this cursor parked at the start with a zero skip
    pub fn rewound(&self) -> Self {
        Self {
            point: self.start,
            skip: 0,
            ..self.clone()
        }
    }

    /// Step the point by the current skip.
    ///
    /// Returns `false` and leaves the point untouched when the step would
    /// leave `[start, end]`.
    pub fn advance(&mut self) -> bool {
        match self.point.checked_add(self.skip) {
            Some(next) if self.is_valid_point(next) => {
                self.point = next;
                true
            }
            _ => false,
        }
    }

    pub fn go_to_start(&mut self) {
        self.point = self.start;
    }

    pub fn go_to_end(&mut self) {
        self.point = self.end;
    }

    /// Move to `point`, failing without change if it is out of range
    pub fn set_point(&mut self, point: i32) -> bool {
        if !self.is_valid_point(point) {
            return false;
        }
        self.point = point;
        true
    }

    pub fn set_skip(&mut self, skip: i32) {
        self.skip = skip;
    }

    pub fn is_valid_point(&self, point: i32) -> bool {
        point >= self.start && point <= self.end
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn point(&self) -> i32 {
        self.point
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn skip(&self) -> i32 {
        self.skip
    }

    /// Number of frames, both bounds included
    pub fn length(&self) -> i32 {
        self.end - self.start + 1
    }

    pub fn length_seconds(&self) -> f64 {
        (self.end - self.start) as f64 / self.rate as f64
    }

    /// Frames elapsed since the start
    pub fn elapsed(&self) -> i32 {
        self.point - self.start
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed() as f64 / self.rate as f64
    }

    /// Fraction of the range covered, 0.0 at the start and 1.0 at the end
    pub fn elapsed_percent(&self) -> f64 {
        self.elapsed() as f64 / (self.end - self.start) as f64
    }
}

/// Two cursors are equal when they describe the same range, whatever
/// their current point and skip are.
impl PartialEq for SequenceCursor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.start == other.start
            && self.end == other.end
            && self.rate == other.rate
    }
}

impl Eq for SequenceCursor {}

/// A sequence of frames with a fixed projection size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    cursor: SequenceCursor,
    width: u32,
    height: u32,
}

impl FrameSequence {
    /// Create a paused frame sequence parked at `start`.
    ///
    /// # Errors
    ///
    /// Fails when `end <= start`, `rate <= 0`, or either dimension is not positive.
    pub fn new(
        name: impl Into<String>,
        start: i32,
        end: i32,
        rate: i32,
        width: i32,
        height: i32,
    ) -> Result<Self, SequenceError> {
        if end <= start {
            return Err(SequenceError::EmptyRange { start, end });
        }
        if rate <= 0 {
            return Err(SequenceError::NonPositiveRate);
        }
        if width <= 0 || height <= 0 {
            return Err(SequenceError::NonPositiveDimension { width, height });
        }

        Ok(Self {
            cursor: SequenceCursor::with_state(name, start, end, rate as u32, 0, start),
            width: width as u32,
            height: height as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cursor(&self) -> &SequenceCursor {
        &self.cursor
    }
}

impl Deref for FrameSequence {
    type Target = SequenceCursor;

    fn deref(&self) -> &SequenceCursor {
        &self.cursor
    }
}

impl DerefMut for FrameSequence {
    fn deref_mut(&mut self) -> &mut SequenceCursor {
        &mut self.cursor
    }
}

/// A frame sequence stored as one file per frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFrameSequence {
    frames: FrameSequence,
    extension: String,
}

impl FileFrameSequence {
    pub fn new(
        name: impl Into<String>,
        start: i32,
        end: i32,
        rate: i32,
        width: i32,
        height: i32,
        extension: impl Into<String>,
    ) -> Result<Self, SequenceError> {
        Ok(Self {
            frames: FrameSequence::new(name, start, end, rate, width, height)?,
            extension: extension.into(),
        })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Resolve the file holding `frame` inside `dir` (`<dir>/<frame>.<ext>`)
    pub fn frame_path(&self, dir: &Path, frame: i32) -> PathBuf {
        dir.join(format!("{}.{}", frame, self.extension))
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    /// Copy parked at the start with a zero skip
    pub fn rewound(&self) -> Self {
        let mut out = self.clone();
        out.frames.cursor = self.frames.cursor.rewound();
        out
    }
}

impl Deref for FileFrameSequence {
    type Target = FrameSequence;

    fn deref(&self) -> &FrameSequence {
        &self.frames
    }
}

impl DerefMut for FileFrameSequence {
    fn deref_mut(&mut self) -> &mut FrameSequence {
        &mut self.frames
    }
}
