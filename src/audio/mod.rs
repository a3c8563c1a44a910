//! PCM audio: sample codec, tracks, output devices and the mixer.

pub mod codec;
pub mod cpal_device;
pub mod device;
pub mod error;
pub mod format;
pub mod mixer;
pub mod params;
pub mod stream;
pub mod track;

pub use codec::SampleCodec;
pub use cpal_device::CpalDevice;
pub use device::{MemoryDevice, NullDevice, OutputBackend, OutputDevice};
pub use error::AudioError;
pub use format::AudioFormat;
pub use mixer::AudioMixer;
pub use params::ChannelParameters;
pub use stream::{MemoryStream, PcmStream, WavStream};
pub use track::{AudioTrackReader, SharedTrack};
