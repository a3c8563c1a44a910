//! PCM stream layout descriptions.

use crate::audio::codec::SampleCodec;
use crate::audio::error::AudioError;

/// Layout of a signed PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits: u16,
    pub big_endian: bool,
}

impl AudioFormat {
    /// Compact disc audio: 44.1 kHz, 16-bit, stereo
    pub const CDDA: AudioFormat = AudioFormat::new(44_100, 2, 16, false);
    /// Digital audio tape: 48 kHz, 16-bit, stereo
    pub const DAT: AudioFormat = AudioFormat::new(48_000, 2, 16, false);
    /// 96 kHz, 24-bit, stereo
    pub const HI_RES: AudioFormat = AudioFormat::new(96_000, 2, 24, false);

    pub const fn new(sample_rate: u32, channels: u16, bits: u16, big_endian: bool) -> Self {
        Self {
            sample_rate,
            channels,
            bits,
            big_endian,
        }
    }

    /// Bytes per sample of one channel
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Codec for the stream's sample containers. Odd depths such as 20-bit
    /// sit left-justified in whole bytes and decode at the container width.
    pub fn codec(&self) -> SampleCodec {
        SampleCodec::new(self.bytes_per_sample() as u32 * 8, self.big_endian)
    }

    /// Bytes per frame across all channels
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64
    }

    /// Bytes consumed per second of playback
    pub fn byte_rate(&self) -> f64 {
        self.frame_size() as f64 * self.frame_rate()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::CDDA
    }
}

impl TryFrom<hound::WavSpec> for AudioFormat {
    type Error = AudioError;

    /// WAV data is little-endian. Float and 8-bit (unsigned) data are rejected.
    fn try_from(spec: hound::WavSpec) -> Result<Self, AudioError> {
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(AudioError::UnsupportedFormat("floating-point PCM".into()));
        }
        if spec.bits_per_sample <= 8 || spec.bits_per_sample > 32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{}-bit PCM",
                spec.bits_per_sample
            )));
        }
        Ok(Self::new(spec.sample_rate, spec.channels, spec.bits_per_sample, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(AudioFormat::CDDA.frame_size(), 4);
        assert_eq!(AudioFormat::DAT.frame_rate(), 48_000.0);
        assert_eq!(AudioFormat::HI_RES.frame_size(), 6);
        assert_eq!(AudioFormat::default(), AudioFormat::CDDA);
        assert_eq!(AudioFormat::CDDA.byte_rate(), 176_400.0);
    }

    #[test]
    fn test_from_wav_spec() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let format = AudioFormat::try_from(spec).unwrap();
        assert_eq!(format, AudioFormat::new(8_000, 1, 16, false));
        assert_eq!(format.frame_size(), 2);

        let float = hound::WavSpec {
            sample_format: hound::SampleFormat::Float,
            bits_per_sample: 32,
            ..spec
        };
        assert!(AudioFormat::try_from(float).is_err());

        let unsigned = hound::WavSpec {
            bits_per_sample: 8,
            ..spec
        };
        assert!(AudioFormat::try_from(unsigned).is_err());
    }

    #[test]
    fn test_codec_matches_container_width() {
        let packed = AudioFormat::new(48_000, 2, 20, false);
        assert_eq!(packed.bytes_per_sample(), 3);
        assert_eq!(packed.codec().bytes_per_sample(), 3);
        assert_eq!(packed.codec().bits(), 24);

        let twelve = AudioFormat::new(8_000, 1, 12, true);
        assert_eq!(twelve.codec().bytes_per_sample(), twelve.frame_size());
        assert!(twelve.codec().is_big_endian());
        assert_eq!(AudioFormat::CDDA.codec().bits(), 16);
    }
}
