//! Freeze intervals.
//!
//! A freezing sequence holds its picture still over half-open intervals
//! `[start, end)` while its audio keeps running. The transport keeps moving
//! an "unfrozen" position at the normal skip; [`FreezeTracker`] maps that
//! position to the frame to display, which is the interval start while the
//! position is inside an interval and the position itself otherwise.

use crate::core::sequence::SequenceCursor;

/// Position differences up to this size are resolved by a linear scan
/// from the last interval instead of a full search
pub const SCAN_LIMIT: i32 = 4;

/// Sorted, non-decreasing interval boundaries, two per interval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeIntervals {
    points: Vec<i32>,
}

impl FreezeIntervals {
    /// Wrap boundaries that are already sorted and of even count
    pub fn from_sorted(points: Vec<i32>) -> Self {
        debug_assert!(points.len() % 2 == 0);
        debug_assert!(points.windows(2).all(|w| w[0] <= w[1]));
        Self { points }
    }

    pub fn points(&self) -> &[i32] {
        &self.points
    }

    /// Number of intervals
    pub fn len(&self) -> usize {
        self.points.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self, interval: usize) -> i32 {
        self.points[interval * 2]
    }

    pub fn end(&self, interval: usize) -> i32 {
        self.points[interval * 2 + 1]
    }

    /// Walk forward from `index` to the frame for `position`
    pub fn scan_forward(&self, position: i32, index: &mut usize) -> i32 {
        while position >= self.end(*index) {
            if *index + 1 >= self.len() {
                return position;
            }
            *index += 1;
        }
        if position < self.start(*index) {
            position
        } else {
            self.start(*index)
        }
    }

    /// Walk backward from `index` to the frame for `position`
    pub fn scan_backward(&self, position: i32, index: &mut usize) -> i32 {
        while position < self.start(*index) {
            if *index == 0 {
                return position;
            }
            *index -= 1;
        }
        if position >= self.end(*index) {
            position
        } else {
            self.start(*index)
        }
    }

    /// Find the frame for `position` from scratch
    pub fn search(&self, position: i32, index: &mut usize) -> i32 {
        for i in 0..self.len() {
            if position >= self.start(i) && position < self.end(i) {
                *index = i;
                return self.start(i);
            } else if position < self.start(i) {
                *index = i;
                return position;
            }
        }
        *index = self.len().saturating_sub(1);
        position
    }
}

/// Whether the display started or stopped holding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeTransition {
    Freeze,
    Thaw,
}

/// Result of moving the unfrozen position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezeStep {
    /// Frame to display
    pub frame: i32,
    pub transition: Option<FreezeTransition>,
}

/// Unfrozen position, transport skip and the interval currently in reach
#[derive(Debug, Clone)]
pub struct FreezeTracker {
    intervals: FreezeIntervals,
    index: usize,
    position: i32,
    skip: i32,
    freezing: bool,
}

impl FreezeTracker {
    pub fn new(intervals: FreezeIntervals, position: i32) -> Self {
        Self {
            intervals,
            index: 0,
            position,
            skip: 0,
            freezing: false,
        }
    }

    pub fn intervals(&self) -> &FreezeIntervals {
        &self.intervals
    }

    /// Where the sequence would be without freezing
    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    /// Transport skip, which the sequence only follows while not frozen
    pub fn skip(&self) -> i32 {
        self.skip
    }

    pub fn set_skip(&mut self, skip: i32) {
        self.skip = skip;
    }

    pub fn is_freezing(&self) -> bool {
        self.freezing
    }

    pub fn set_freezing(&mut self, freezing: bool) {
        self.freezing = freezing;
    }

    /// Unfrozen position after one tick at the transport skip
    pub fn next_position(&self) -> i32 {
        self.position.saturating_add(self.skip)
    }

    /// Frame to show for the unfrozen `position`.
    ///
    /// `sequence` supplies the bounds and the frame on screen, which stays
    /// put when the position has not moved.
    pub fn next_frame(&mut self, position: i32, sequence: &SequenceCursor) -> i32 {
        if self.intervals.is_empty() {
            return position;
        }
        let diff = position - self.position;
        if diff == 0 {
            return sequence.point();
        }
        if self.position == sequence.start() {
            self.index = 0;
        } else if self.position == sequence.end() {
            self.index = self.intervals.len() - 1;
        }

        if diff.abs() <= SCAN_LIMIT {
            if diff > 0 {
                self.intervals.scan_forward(position, &mut self.index)
            } else {
                self.intervals.scan_backward(position, &mut self.index)
            }
        } else {
            self.intervals.search(position, &mut self.index)
        }
    }

    /// Resolve the frame for `position` and update the frozen state.
    ///
    /// The unfrozen position itself is left for the caller to commit once
    /// the frame has been accepted by the sequence.
    pub fn resolve(&mut self, position: i32, sequence: &SequenceCursor) -> FreezeStep {
        let frame = self.next_frame(position, sequence);
        let transition = if frame != position && !self.freezing {
            self.freezing = true;
            Some(FreezeTransition::Freeze)
        } else if frame == position && self.freezing {
            self.freezing = false;
            Some(FreezeTransition::Thaw)
        } else {
            None
        };
        FreezeStep { frame, transition }
    }
}
