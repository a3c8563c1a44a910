//! Frame selection across several read-ahead lenses.
//!
//! Lenses fill independently, so on each render tick the renderer looks at
//! the next buffered frame of every lens and takes the nearest one in the
//! direction of travel: the smallest identifier when moving forward, the
//! largest when moving backward. The chosen frame is handed to a
//! [`FrameSink`], which owns the actual presentation.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::decode::decoder::VideoFrame;
use crate::decode::frame_lens::FrameLens;

/// Where rendered frames go
pub trait FrameSink: Send {
    /// Show `frame`. Blank frames carry no image.
    fn present(&mut self, frame: &VideoFrame);

    /// Release presentation resources
    fn clear(&mut self) {}
}

/// A sink that discards every frame
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &VideoFrame) {}
}

#[derive(Default)]
struct RenderState {
    current: Option<VideoFrame>,
    previous: Option<i32>,
}

/// Renders the nearest buffered frame out of a group of lenses
pub struct MultiLensRenderer {
    lenses: Arc<[FrameLens]>,
    state: Mutex<RenderState>,
    sink: Mutex<Box<dyn FrameSink>>,
}

impl MultiLensRenderer {
    pub fn new(lenses: Arc<[FrameLens]>, sink: Box<dyn FrameSink>) -> Self {
        Self {
            lenses,
            state: Mutex::new(RenderState::default()),
            sink: Mutex::new(sink),
        }
    }

    /// Advance to the next frame, if any lens has one ready.
    ///
    /// Updates are serialized, so a frame polled before a lens restart is
    /// always replaced by the next update.
    pub fn update(&self) {
        let mut state = self.state.lock();
        let Some(index) = self.next_lens() else {
            return;
        };
        let Some(frame) = self.lenses[index].poll() else {
            return;
        };
        trace!(frame = frame.identifier, lens = index, "Rendering frame");

        self.sink.lock().present(&frame);
        state.previous = state.current.as_ref().map(|f| f.identifier);
        state.current = Some(frame);
    }

    /// Identifier of the frame on screen, `None` before the first one
    pub fn frame(&self) -> Option<i32> {
        self.state.lock().current.as_ref().map(|f| f.identifier)
    }

    /// Identifier of the frame shown before the current one
    pub fn previous_frame(&self) -> Option<i32> {
        self.state.lock().previous
    }

    pub fn current(&self) -> Option<VideoFrame> {
        self.state.lock().current.clone()
    }

    pub fn lens_count(&self) -> usize {
        self.lenses.len()
    }

    /// Drop the current frame and release the sink
    pub fn clear(&self) {
        let mut state = self.state.lock();
        self.sink.lock().clear();
        *state = RenderState::default();
    }

    fn next_lens(&self) -> Option<usize> {
        if self.lenses.len() == 1 {
            return Some(0);
        }
        let reverse = self.lenses.first()?.params().skip < 0;
        let initial = if reverse { i32::MIN } else { i32::MAX };

        let (index, nearest) = self
            .lenses
            .iter()
            .enumerate()
            .map(|(i, lens)| (i, lens.next_identifier()))
            .fold((None, initial), |(best, nearest), (i, id)| {
                if (reverse && id > nearest) || (!reverse && id < nearest) {
                    (Some(i), id)
                } else {
                    (best, nearest)
                }
            });
        if nearest == initial {
            None
        } else {
            index
        }
    }
}
