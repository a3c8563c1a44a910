//! Error type shared by the audio subsystem.

use std::io;

/// Error type for audio tracks, the mixer and output devices
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAV container error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Channel {channel} out of range (capacity {capacity})")]
    ChannelOutOfRange { channel: usize, capacity: usize },
    #[error("Channel {0} is not free")]
    ChannelNotFree(usize),
    #[error("{0} closed")]
    Closed(&'static str),
    #[error("No audio output device available")]
    NoDevice,
    #[error("cpal device error: {0}")]
    Device(#[from] cpal::DevicesError),
    #[error("cpal default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("cpal build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("cpal play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("cpal stream error: {0}")]
    Stream(#[from] cpal::StreamError),
    #[error("Output device thread exited")]
    DeviceThread,
}
