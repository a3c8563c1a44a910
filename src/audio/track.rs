//! Audio track reader.
//!
//! An [`AudioTrackReader`] wraps one [`PcmStream`] and keeps the transport
//! state the mixer needs: a mark to loop back to, whether the data is
//! exhausted, and whether the track has died. Reads always fill the caller's
//! buffer, padding with silence at the end of a non-looping track.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::codec::SampleCodec;
use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;
use crate::audio::stream::{MemoryStream, PcmStream, WavStream};
use crate::core::time::bytes_to_seconds;

/// A track shared between its owner and the mixer thread
pub type SharedTrack = Arc<Mutex<AudioTrackReader>>;

/// Reader over the PCM data of a single track
pub struct AudioTrackReader {
    stream: Box<dyn PcmStream>,
    format: AudioFormat,
    stream_size: u64,
    mark_position: u64,
    looping: bool,
    done: bool,
    dead: bool,
    death_cause: Option<Arc<AudioError>>,
}

impl AudioTrackReader {
    /// Open a WAV file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let (stream, format) = WavStream::open(path)?;
        Ok(Self::new(Box::new(stream), format))
    }

    /// Wrap PCM bytes held in memory
    pub fn from_bytes(data: Vec<u8>, format: AudioFormat) -> Self {
        Self::new(Box::new(MemoryStream::new(data)), format)
    }

    /// Wrap an arbitrary stream positioned at its first byte
    pub fn new(stream: Box<dyn PcmStream>, format: AudioFormat) -> Self {
        let stream_size = stream.remaining();

        Self {
            stream,
            format,
            stream_size,
            mark_position: 0,
            looping: false,
            done: stream_size == 0,
            dead: false,
            death_cause: None,
        }
    }

    /// Wrap into a handle the mixer can share
    pub fn into_shared(self) -> SharedTrack {
        Arc::new(Mutex::new(self))
    }

    /// Fill `buffer` from the track.
    ///
    /// Returns the number of bytes that came from the stream, or `None` once
    /// the track is dead. A short read pads the rest of the buffer with
    /// silence and marks the track done. Looping tracks continue from the
    /// mark and always fill the buffer.
    pub fn read(&mut self, buffer: &mut [u8]) -> Option<usize> {
        if self.dead {
            return None;
        }
        if self.done && !self.looping {
            SampleCodec::zero(buffer);
            return Some(0);
        }
        let result = if self.looping && self.is_loopable() {
            self.read_seamlessly(buffer)
        } else {
            self.read_once(buffer)
        };

        match result {
            Ok(n) => Some(n),
            Err(e) => {
                self.die(e);
                None
            }
        }
    }

    /// Advance by `amount` bytes, wrapping to the mark when looping
    pub fn skip(&mut self, amount: u64) {
        if self.dead {
            return;
        }
        let result = if self.looping && self.is_loopable() {
            self.skip_seamlessly(amount)
        } else {
            self.skip_once(amount)
        };
        if let Err(e) = result {
            self.die(e);
        }
    }

    /// Remember the current position as the loop/jump target
    pub fn mark(&mut self) {
        if self.dead {
            return;
        }
        self.mark_position = self.stream_size - self.stream.remaining();
    }

    /// Return to the marked position
    pub fn jump_to_mark(&mut self) {
        if self.dead {
            return;
        }
        let mark = self.mark_position;
        match self.stream.rewind() {
            Ok(()) => {
                self.done = false;
                self.skip(mark);
            }
            Err(e) => self.die(e.into()),
        }
    }

    /// Return to the first byte
    pub fn jump_to_start(&mut self) {
        if self.dead {
            return;
        }
        match self.stream.rewind() {
            Ok(()) => self.update_done(),
            Err(e) => self.die(e.into()),
        }
    }

    /// Release the stream. The track is dead afterwards.
    pub fn close(&mut self) {
        if self.dead {
            return;
        }
        match self.stream.close() {
            Ok(()) => self.die(AudioError::Closed("Stream")),
            Err(e) => self.die(e.into()),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Sample codec matching this track's bit depth and byte order
    pub fn codec(&self) -> SampleCodec {
        self.format.codec()
    }

    /// Total size of the PCM data in bytes
    pub fn stream_size(&self) -> u64 {
        self.stream_size
    }

    pub fn mark_position(&self) -> u64 {
        self.mark_position
    }

    /// Bytes left before the end, `None` once dead
    pub fn available(&self) -> Option<u64> {
        (!self.dead).then(|| self.stream.remaining())
    }

    /// Current byte offset, `None` once dead
    pub fn position(&self) -> Option<u64> {
        (!self.dead).then(|| self.stream_size - self.stream.remaining())
    }

    pub fn duration_seconds(&self) -> f64 {
        bytes_to_seconds(self.stream_size, self.format.frame_size(), self.format.frame_rate())
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds_plus(0)
    }

    /// Seconds played, less `plus` bytes still queued downstream
    pub fn elapsed_seconds_plus(&self, plus: i64) -> f64 {
        if self.dead {
            return 0.0;
        }
        let bytes = self.played_bytes(plus);
        bytes as f64 / self.format.byte_rate()
    }

    pub fn elapsed_percent(&self) -> f64 {
        self.elapsed_percent_plus(0)
    }

    /// Fraction of the data played, less `plus` bytes. Never negative.
    pub fn elapsed_percent_plus(&self, plus: i64) -> f64 {
        if self.dead || self.stream_size == 0 {
            return 0.0;
        }
        (self.played_bytes(plus) as f64 / self.stream_size as f64).max(0.0)
    }

    pub fn death_cause(&self) -> Option<Arc<AudioError>> {
        self.death_cause.clone()
    }

    /// Enable or disable looping. Returns whether looping is now active.
    pub fn set_loop(&mut self, looping: bool) -> bool {
        self.looping = looping && self.is_loopable();
        self.update_done();
        self.looping
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.set_loop(!self.looping)
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Looping needs at least one byte between the mark and the end
    fn is_loopable(&self) -> bool {
        self.mark_position < self.stream_size
    }

    fn played_bytes(&self, plus: i64) -> i64 {
        (self.stream_size - self.stream.remaining()) as i64 - plus
    }

    fn read_once(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        let filled = self.fill(buffer)?;

        if filled < buffer.len() {
            SampleCodec::zero(&mut buffer[filled..]);
            self.done = true;
        } else if self.stream.remaining() == 0 {
            self.done = true;
        }
        Ok(filled)
    }

    fn read_seamlessly(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        let mut filled = 0;

        while filled < buffer.len() {
            if self.stream.remaining() == 0 {
                self.wrap()?;
            }
            let n = self.stream.read(&mut buffer[filled..])?;
            if n == 0 {
                // The stream reports data it cannot deliver
                SampleCodec::zero(&mut buffer[filled..]);
                self.done = true;
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Read until the buffer is full or the stream runs dry
    fn fill(&mut self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        let mut filled = 0;

        while filled < buffer.len() {
            let n = self.stream.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn skip_once(&mut self, mut amount: u64) -> Result<(), AudioError> {
        while amount > 0 {
            let n = self.stream.skip(amount)?;
            amount -= n;
            if self.stream.remaining() == 0 || n == 0 {
                self.done = true;
                return Ok(());
            }
        }
        self.update_done();
        Ok(())
    }

    fn skip_seamlessly(&mut self, amount: u64) -> Result<(), AudioError> {
        let period = self.stream_size - self.mark_position;
        let mut amount = amount;

        while amount > 0 {
            let n = self.stream.skip(amount)?;
            amount -= n;
            if self.stream.remaining() == 0 {
                self.wrap()?;
                amount %= period;
            } else if n == 0 {
                break;
            }
        }
        self.update_done();
        Ok(())
    }

    /// Rewind and move to the mark
    fn wrap(&mut self) -> Result<(), AudioError> {
        self.stream.rewind()?;
        let mut left = self.mark_position;
        while left > 0 {
            let n = self.stream.skip(left)?;
            if n == 0 {
                break;
            }
            left -= n;
        }
        debug!(mark = self.mark_position, "Track wrapped to mark");
        Ok(())
    }

    fn update_done(&mut self) {
        self.done = self.stream.remaining() == 0 && !self.looping;
    }

    fn die(&mut self, cause: AudioError) {
        match &cause {
            AudioError::Closed(_) => debug!("Track closed"),
            other => warn!(error = %other, "Track died"),
        }
        self.dead = true;
        self.death_cause = Some(Arc::new(cause));
    }
}

impl std::fmt::Debug for AudioTrackReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTrackReader")
            .field("format", &self.format)
            .field("stream_size", &self.stream_size)
            .field("position", &self.position())
            .field("looping", &self.looping)
            .field("done", &self.done)
            .field("dead", &self.dead)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_8k() -> AudioFormat {
        AudioFormat::new(8_000, 1, 16, false)
    }

    fn track(len: usize) -> AudioTrackReader {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
        AudioTrackReader::from_bytes(data, mono_8k())
    }

    #[test]
    fn test_short_read_zero_fills_and_marks_done() {
        let mut t = track(6);
        let mut buffer = [0xAAu8; 4];
        assert_eq!(t.read(&mut buffer), Some(4));
        assert!(!t.is_done());

        assert_eq!(t.read(&mut buffer), Some(2));
        assert_eq!(buffer, [5, 6, 0, 0]);
        assert!(t.is_done());

        // Reads after the end still hand back silence
        buffer = [0xAA; 4];
        assert_eq!(t.read(&mut buffer), Some(0));
        assert_eq!(buffer, [0; 4]);
    }

    #[test]
    fn test_exact_read_marks_done() {
        let mut t = track(4);
        let mut buffer = [0u8; 4];
        assert_eq!(t.read(&mut buffer), Some(4));
        assert!(t.is_done());
    }

    #[test]
    fn test_loop_read_is_seamless() {
        let mut t = track(6);
        t.skip(2);
        t.mark();
        t.jump_to_start();
        assert!(t.set_loop(true));

        let mut buffer = [0u8; 10];
        assert_eq!(t.read(&mut buffer), Some(10));
        // 1..=6, then back to the mark at offset 2
        assert_eq!(buffer, [1, 2, 3, 4, 5, 6, 3, 4, 5, 6]);
        assert!(!t.is_done());
        assert_eq!(t.position(), Some(6));
    }

    #[test]
    fn test_loop_skip_wraps() {
        let mut t = track(8);
        t.set_loop(true);
        t.skip(19);
        // 8-byte period from offset 0: 19 % 8 == 3
        assert_eq!(t.position(), Some(3));
        assert!(!t.is_done());
    }

    #[test]
    fn test_skip_past_end_marks_done() {
        let mut t = track(8);
        t.skip(100);
        assert!(t.is_done());
        assert_eq!(t.available(), Some(0));
        t.jump_to_start();
        assert!(!t.is_done());
        assert_eq!(t.available(), Some(8));
    }

    #[test]
    fn test_mark_and_jump() {
        let mut t = track(10);
        t.skip(4);
        t.mark();
        t.skip(3);
        assert_eq!(t.position(), Some(7));
        t.jump_to_mark();
        assert_eq!(t.position(), Some(4));
        assert_eq!(t.mark_position(), 4);
    }

    #[test]
    fn test_close_is_terminal() {
        let mut t = track(10);
        t.close();
        assert!(t.is_dead());
        assert!(matches!(
            t.death_cause().as_deref(),
            Some(AudioError::Closed(_))
        ));
        let mut buffer = [0u8; 4];
        assert_eq!(t.read(&mut buffer), None);
        assert_eq!(t.position(), None);
        assert_eq!(t.elapsed_percent(), 0.0);
        t.skip(2);
        t.jump_to_start();
        assert!(t.is_dead());
    }

    #[test]
    fn test_time_queries() {
        // one second of 8 kHz mono 16-bit audio
        let mut t = track(16_000);
        assert!((t.duration_seconds() - 1.0).abs() < 1e-9);
        t.skip(4_000);
        assert!((t.elapsed_seconds() - 0.25).abs() < 1e-9);
        assert!((t.elapsed_percent() - 0.25).abs() < 1e-9);
        assert!((t.elapsed_seconds_plus(2_000) - 0.125).abs() < 1e-9);
        assert_eq!(t.elapsed_percent_plus(8_000), 0.0);
    }

    #[test]
    fn test_toggle_loop() {
        let mut t = track(4);
        assert!(t.toggle_loop());
        assert!(t.is_loop());
        assert!(!t.toggle_loop());

        let mut empty = track(0);
        assert!(!empty.set_loop(true));
        assert!(empty.is_done());
    }
}
