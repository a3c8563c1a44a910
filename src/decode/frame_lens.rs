//! Read-ahead lenses over a file-per-frame sequence.
//!
//! K lenses cooperate on one sequence: lens `b` of `K` starts at
//! `point + skip * b` and steps by `skip * K`, so together they cover every
//! frame the cursor will visit while each thread only decodes every Kth one.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::sequence::FileFrameSequence;
use crate::decode::decoder::{FrameDecoder, VideoFrame};
use crate::decode::read_ahead::{BufferError, Producer, ReadAheadBuffer};

/// Cursor position and step the lenses restart from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LensParams {
    pub point: i32,
    pub skip: i32,
}

/// Lens parameters shared by every lens of one worker
pub type SharedLensParams = Arc<Mutex<LensParams>>;

/// Decodes frames for one lens on its production thread
struct FrameReader {
    dir: PathBuf,
    sequence: FileFrameSequence,
    decoder: Arc<dyn FrameDecoder>,
    params: SharedLensParams,
    offset: i32,
    stride: i32,
    frame: i32,
    step: i32,
}

impl Producer for FrameReader {
    type Item = VideoFrame;

    fn restart(&mut self) {
        let params = *self.params.lock();
        self.frame = params.point.saturating_add(params.skip.saturating_mul(self.offset));
        self.step = params.skip.saturating_mul(self.stride);
    }

    fn ready(&self) -> bool {
        self.sequence.is_valid_point(self.frame)
    }

    fn produce(&mut self) -> Result<VideoFrame, BufferError> {
        let frame = self.frame;
        let path = self.sequence.frame_path(&self.dir, frame);

        let out = match self.decoder.decode(&path) {
            Ok(image) => VideoFrame::new(frame, image),
            Err(e) if e.is_frame_local() => {
                debug!(frame, error = %e, "Substituting blank frame");
                VideoFrame::blank(frame)
            }
            Err(e) => return Err(e.into()),
        };
        self.frame = frame.saturating_add(self.step);
        Ok(out)
    }
}

/// One of the K read-ahead buffers feeding the renderer
pub struct FrameLens {
    buffer: ReadAheadBuffer<VideoFrame>,
    params: SharedLensParams,
    offset: i32,
}

impl FrameLens {
    /// Create lens number `offset`, idle until [`FrameLens::start`]
    pub fn new(params: SharedLensParams, offset: usize, capacity: usize) -> Self {
        Self {
            buffer: ReadAheadBuffer::new(capacity),
            params,
            offset: offset as i32,
        }
    }

    /// Build `count` lenses sharing `params`
    pub fn group(params: &SharedLensParams, count: usize, capacity: usize) -> Vec<FrameLens> {
        (0..count)
            .map(|b| FrameLens::new(Arc::clone(params), b, capacity))
            .collect()
    }

    /// Start decoding `sequence` frames from `dir`, every `stride`th frame
    pub fn start(
        &self,
        dir: PathBuf,
        sequence: FileFrameSequence,
        stride: usize,
        decoder: Arc<dyn FrameDecoder>,
    ) -> io::Result<()> {
        let reader = FrameReader {
            dir,
            sequence,
            decoder,
            params: Arc::clone(&self.params),
            offset: self.offset,
            stride: stride.max(1) as i32,
            frame: 0,
            step: 0,
        };
        self.buffer.start(&format!("lens-{}", self.offset), reader)
    }

    /// Restart from the current shared parameters
    pub fn call(&self) {
        self.buffer.call();
    }

    /// Block until the restart is done and a frame is buffered
    pub fn wait_ready(&self) {
        self.buffer.wait_ready();
    }

    pub fn poll(&self) -> Option<VideoFrame> {
        self.buffer.poll()
    }

    pub fn discard(&self) {
        self.buffer.discard();
    }

    pub fn clear(&self) {
        self.buffer.clear();
    }

    /// Identifier of the next buffered frame.
    ///
    /// An empty lens reports `i32::MAX` when moving forward and `i32::MIN`
    /// when moving backward, so it never wins the nearest-frame selection.
    pub fn next_identifier(&self) -> i32 {
        let skip = self.params.lock().skip;
        self.buffer
            .peek_with(|frame| frame.identifier)
            .unwrap_or(if skip >= 0 { i32::MAX } else { i32::MIN })
    }

    pub fn interrupt(&self) {
        self.buffer.interrupt();
    }

    pub fn join(&self) {
        self.buffer.join();
    }

    /// Parameters the lens restarts from on its next call
    pub fn params(&self) -> LensParams {
        *self.params.lock()
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn used(&self) -> usize {
        self.buffer.used()
    }

    pub fn is_dead(&self) -> bool {
        self.buffer.is_dead()
    }

    pub fn death_cause(&self) -> Option<Arc<BufferError>> {
        self.buffer.death_cause()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decoder::{DecodeError, FrameImage};
    use std::path::Path;

    /// Decodes every frame to a 1x1 image, failing on chosen frame numbers
    struct StubDecoder {
        missing: Vec<i32>,
        broken: Option<i32>,
    }

    impl FrameDecoder for StubDecoder {
        fn decode(&self, path: &Path) -> Result<FrameImage, DecodeError> {
            let frame: i32 = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap();
            if self.missing.contains(&frame) {
                return Err(DecodeError::FileNotFound(path.to_path_buf()));
            }
            if self.broken == Some(frame) {
                return Err(DecodeError::Io {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, "bad sector"),
                });
            }
            Ok(FrameImage {
                data: vec![0; 4],
                width: 1,
                height: 1,
            })
        }
    }

    fn sequence() -> FileFrameSequence {
        FileFrameSequence::new("lens", 0, 99, 30, 4, 3, "png").unwrap()
    }

    fn start_group(
        point: i32,
        skip: i32,
        count: usize,
        decoder: StubDecoder,
    ) -> (SharedLensParams, Vec<FrameLens>) {
        let params = Arc::new(Mutex::new(LensParams { point, skip }));
        let lenses = FrameLens::group(&params, count, 4);
        let decoder: Arc<dyn FrameDecoder> = Arc::new(decoder);
        for lens in &lenses {
            lens.start(PathBuf::from("/frames"), sequence(), count, Arc::clone(&decoder))
                .unwrap();
        }
        for lens in &lenses {
            lens.wait_ready();
        }
        (params, lenses)
    }

    fn ok_decoder() -> StubDecoder {
        StubDecoder {
            missing: Vec::new(),
            broken: None,
        }
    }

    #[test]
    fn test_lenses_interleave() {
        let (_, lenses) = start_group(10, 1, 3, ok_decoder());
        let firsts: Vec<_> = lenses.iter().map(|l| l.poll().unwrap().identifier).collect();
        assert_eq!(firsts, vec![10, 11, 12]);
        let seconds: Vec<_> = lenses.iter().map(|l| l.poll().unwrap().identifier).collect();
        assert_eq!(seconds, vec![13, 14, 15]);
        lenses.iter().for_each(FrameLens::join);
    }

    #[test]
    fn test_reverse_scan_stops_at_start() {
        let (_, lenses) = start_group(9, -4, 2, ok_decoder());
        std::thread::sleep(std::time::Duration::from_millis(30));
        // lens 0 visits 9, 1; lens 1 visits 5
        let a: Vec<_> = std::iter::from_fn(|| lenses[0].poll().map(|f| f.identifier)).collect();
        let b: Vec<_> = std::iter::from_fn(|| lenses[1].poll().map(|f| f.identifier)).collect();
        assert_eq!(a, vec![9, 1]);
        assert_eq!(b, vec![5]);
        assert_eq!(lenses[0].next_identifier(), i32::MIN);
        lenses.iter().for_each(FrameLens::join);
    }

    #[test]
    fn test_call_picks_up_new_point() {
        let (params, lenses) = start_group(0, 1, 1, ok_decoder());
        assert_eq!(lenses[0].next_identifier(), 0);

        *params.lock() = LensParams { point: 40, skip: 0 };
        lenses[0].call();
        lenses[0].wait_ready();
        assert_eq!(lenses[0].next_identifier(), 40);
        lenses[0].join();
    }

    #[test]
    fn test_missing_frame_is_blank() {
        let decoder = StubDecoder {
            missing: vec![1],
            broken: None,
        };
        let (_, lenses) = start_group(0, 1, 1, decoder);
        assert!(!lenses[0].poll().unwrap().is_blank());
        let blank = lenses[0].poll().unwrap();
        assert_eq!(blank.identifier, 1);
        assert!(blank.is_blank());
        assert!(!lenses[0].is_dead());
        lenses[0].join();
    }

    #[test]
    fn test_io_failure_kills_lens() {
        let decoder = StubDecoder {
            missing: Vec::new(),
            broken: Some(2),
        };
        let (_, lenses) = start_group(0, 1, 1, decoder);
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert!(lenses[0].is_dead());
        assert!(matches!(
            lenses[0].death_cause().as_deref(),
            Some(BufferError::Decode(DecodeError::Io { .. }))
        ));
        assert_eq!(lenses[0].used(), 2);
        lenses[0].join();
    }

    #[test]
    fn test_empty_lens_sentinel_follows_direction() {
        let params = Arc::new(Mutex::new(LensParams { point: 0, skip: 1 }));
        let lens = FrameLens::new(Arc::clone(&params), 0, 4);
        assert_eq!(lens.next_identifier(), i32::MAX);
        params.lock().skip = -1;
        assert_eq!(lens.next_identifier(), i32::MIN);
    }
}
