//! Output device abstraction for the mixer.
//!
//! The mixer writes interleaved PCM bytes in its own format and paces
//! itself by polling how much space the device has left. [`NullDevice`]
//! consumes audio in real time without producing sound; [`MemoryDevice`]
//! keeps everything written for inspection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::cpal_device::CpalDevice;
use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;

/// A sink for mixed PCM bytes
pub trait OutputDevice: Send {
    /// Queue `data` for playback, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, AudioError>;

    /// Free space in the device's internal buffer, in bytes
    fn available(&self) -> usize;

    /// Size of the device's internal buffer, in bytes
    fn buffer_size(&self) -> usize;

    /// Drop everything queued but not yet played
    fn flush(&mut self);

    /// Release the device. Further writes fail.
    fn close(&mut self) {}
}

/// A device that plays silence at the pace of real hardware
pub struct NullDevice {
    byte_rate: f64,
    buffer_size: usize,
    queued: f64,
    last_drain: Instant,
    closed: bool,
}

impl NullDevice {
    /// Create a device draining `format`'s byte rate from a buffer of
    /// `buffer_size` bytes
    pub fn new(format: AudioFormat, buffer_size: usize) -> Self {
        Self {
            byte_rate: format.byte_rate(),
            buffer_size,
            queued: 0.0,
            last_drain: Instant::now(),
            closed: false,
        }
    }

    fn queued_now(&self) -> f64 {
        let drained = self.last_drain.elapsed().as_secs_f64() * self.byte_rate;
        (self.queued - drained).max(0.0)
    }
}

impl OutputDevice for NullDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, AudioError> {
        if self.closed {
            return Err(AudioError::Closed("Output device"));
        }
        self.queued = self.queued_now() + data.len() as f64;
        self.last_drain = Instant::now();
        Ok(data.len())
    }

    fn available(&self) -> usize {
        let free = self.buffer_size as f64 - self.queued_now();
        free.max(0.0) as usize
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn flush(&mut self) {
        self.queued = 0.0;
        self.last_drain = Instant::now();
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Everything a [`MemoryDevice`] has received, shared with its creator
#[derive(Debug, Default)]
pub struct Capture {
    pub writes: Vec<Vec<u8>>,
    pub flushes: usize,
    pub closed: bool,
}

/// A device with unlimited capacity that records every write
#[derive(Clone)]
pub struct MemoryDevice {
    capture: Arc<Mutex<Capture>>,
    buffer_size: usize,
    /// Fail every write once this many have succeeded
    fail_after: Option<usize>,
}

impl MemoryDevice {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            capture: Arc::new(Mutex::new(Capture::default())),
            buffer_size,
            fail_after: None,
        }
    }

    /// Make writes fail after `count` successful ones
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Handle to the captured data
    pub fn capture(&self) -> Arc<Mutex<Capture>> {
        Arc::clone(&self.capture)
    }
}

impl OutputDevice for MemoryDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, AudioError> {
        let mut capture = self.capture.lock();
        if capture.closed {
            return Err(AudioError::Closed("Output device"));
        }
        if self.fail_after.is_some_and(|n| capture.writes.len() >= n) {
            return Err(AudioError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device disconnected",
            )));
        }
        capture.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn available(&self) -> usize {
        self.buffer_size
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn flush(&mut self) {
        self.capture.lock().flushes += 1;
    }

    fn close(&mut self) {
        self.capture.lock().closed = true;
    }
}

/// Which kind of device a mixer writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// The system's default output through cpal
    #[default]
    Cpal,
    /// Real-time paced silence
    Null,
}

impl OutputBackend {
    /// Open a device of this kind for `format`
    pub fn open(
        self,
        format: AudioFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn OutputDevice>, AudioError> {
        match self {
            OutputBackend::Cpal => Ok(Box::new(CpalDevice::open(format, buffer_size)?)),
            OutputBackend::Null => Ok(Box::new(NullDevice::new(format, buffer_size))),
        }
    }
}

/// Sleep interval used while waiting for device space: half the play time
/// of one mixer buffer, rounded up to whole milliseconds
pub fn nap_length(buffer_size: usize, format: AudioFormat) -> Duration {
    let millis = (500.0 * buffer_size as f64 / format.byte_rate()).ceil();
    Duration::from_millis(millis.max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nap_length() {
        // 4800 bytes of CDDA is ~27.2 ms; half of that rounds up to 14 ms
        assert_eq!(nap_length(4800, AudioFormat::CDDA), Duration::from_millis(14));
        assert_eq!(nap_length(0, AudioFormat::CDDA), Duration::from_millis(1));
    }

    #[test]
    fn test_null_device_drains_over_time() {
        let format = AudioFormat::new(8_000, 1, 16, false);
        let mut device = NullDevice::new(format, 16_000);
        assert_eq!(device.available(), 16_000);

        device.write(&[0u8; 16_000]).unwrap();
        assert!(device.available() < 1_000);

        std::thread::sleep(Duration::from_millis(100));
        // 100 ms at 16000 bytes/s frees roughly 1600 bytes
        assert!(device.available() >= 1_500);

        device.flush();
        assert_eq!(device.available(), 16_000);

        device.close();
        assert!(device.write(&[0u8; 2]).is_err());
    }

    #[test]
    fn test_memory_device_records() {
        let mut device = MemoryDevice::new(100).failing_after(2);
        let capture = device.capture();

        device.write(&[1, 2]).unwrap();
        device.write(&[3]).unwrap();
        assert!(device.write(&[4]).is_err());
        device.flush();

        let capture = capture.lock();
        assert_eq!(capture.writes, vec![vec![1, 2], vec![3]]);
        assert_eq!(capture.flushes, 1);
    }

    #[test]
    fn test_null_backend_opens() {
        let device = OutputBackend::Null.open(AudioFormat::CDDA, 9_600).unwrap();
        assert_eq!(device.buffer_size(), 9_600);
        assert_eq!(device.available(), 9_600);
    }
}
