//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use frameplay::audio::OutputBackend;
use frameplay::decode::{DecodeError, FrameDecoder, FrameImage};
use frameplay::playback::{Presenter, TransportEvent};
use frameplay::{PlayerConfig, WorkerContext};

/// Decodes every path to the same one-pixel image
pub struct StubDecoder;

impl FrameDecoder for StubDecoder {
    fn decode(&self, _path: &Path) -> Result<FrameImage, DecodeError> {
        Ok(FrameImage {
            data: vec![0, 0, 0, 255],
            width: 1,
            height: 1,
        })
    }
}

/// Decodes like [`StubDecoder`] until frame `from`, where reading fails
pub struct FailingDecoder {
    pub from: i32,
}

impl FrameDecoder for FailingDecoder {
    fn decode(&self, path: &Path) -> Result<FrameImage, DecodeError> {
        let frame: i32 = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse().ok())
            .unwrap_or(0);
        if frame >= self.from {
            return Err(DecodeError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
            });
        }
        StubDecoder.decode(path)
    }
}

/// Keeps every event and status line it is sent
#[derive(Default)]
pub struct RecordingPresenter {
    pub events: Mutex<Vec<TransportEvent>>,
    pub statuses: Mutex<Vec<String>>,
    pub title: Mutex<Option<String>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().last().cloned()
    }
}

impl Presenter for RecordingPresenter {
    fn event(&self, event: TransportEvent) {
        self.events.lock().push(event);
    }

    fn status(&self, title: Option<&str>, text: &str) {
        if let Some(title) = title {
            *self.title.lock() = Some(title.to_string());
        }
        self.statuses.lock().push(text.to_string());
    }
}

pub fn config() -> PlayerConfig {
    PlayerConfig {
        output: OutputBackend::Null,
        ..PlayerConfig::default()
    }
}

pub fn context(presenter: &Arc<RecordingPresenter>) -> WorkerContext {
    WorkerContext {
        presenter: Arc::clone(presenter) as Arc<dyn Presenter>,
        decoder: Arc::new(StubDecoder),
        ..WorkerContext::default()
    }
}

/// Write `metadata.toml` for a plain sequence, plus any `extra` lines
pub fn write_sequence(dir: &Path, start: i32, end: i32, rate: i32, extra: &str) {
    let text = format!(
        "name = \"Test\"\nstart = {}\nend = {}\nrate = {}\nwidth = 64\nheight = 48\n\
         extension = \"png\"\n{}\n",
        start, end, rate, extra
    );
    std::fs::write(dir.join("metadata.toml"), text).unwrap();
}

/// Write a silent 16-bit stereo CD-quality WAV of `frames` sample frames
pub fn write_wav(path: &Path, frames: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..frames * 2 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Poll `condition` until it holds, failing after ten seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
