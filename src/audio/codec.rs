//! Signed PCM sample conversion.
//!
//! A [`SampleCodec`] reads and writes integer samples of 1 to 4 bytes in
//! either byte order, and provides the arithmetic the mixer needs: gain,
//! additive mixing and clipping to the representable range.

/// PCM sample encoder/decoder for one bit depth and byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    bits: u32,
    bytes: usize,
    big_endian: bool,
    min: i64,
    max: i64,
}

impl SampleCodec {
    /// Create a codec. The bit depth is rounded down to a multiple of 8 and
    /// clamped to `[8, 32]`.
    pub fn new(bit_depth: u32, big_endian: bool) -> Self {
        let bits = (bit_depth - bit_depth % 8).clamp(8, 32);

        Self {
            bits,
            bytes: (bits / 8) as usize,
            big_endian,
            min: -(1i64 << (bits - 1)),
            max: (1i64 << (bits - 1)) - 1,
        }
    }

    /// Decode one sample at `index` using the codec's own byte order
    pub fn decode_native(&self, buffer: &[u8], index: usize) -> i32 {
        self.decode(buffer, index, self.big_endian)
    }

    /// Decode one sample at `index` using the given byte order.
    ///
    /// The upper bytes of the result are filled from the sign bit of the
    /// most significant stored byte, so narrow samples come back as
    /// properly signed 32-bit values.
    pub fn decode(&self, buffer: &[u8], index: usize, big_endian: bool) -> i32 {
        let stored = &buffer[index..index + self.bytes];
        let mut le = [0u8; 4];

        for (i, slot) in le.iter_mut().take(self.bytes).enumerate() {
            *slot = if big_endian {
                stored[self.bytes - 1 - i]
            } else {
                stored[i]
            };
        }
        if le[self.bytes - 1] & 0x80 != 0 {
            for slot in le.iter_mut().skip(self.bytes) {
                *slot = 0xFF;
            }
        }
        i32::from_le_bytes(le)
    }

    /// Write the low `bytes` of `value` at `index` in the codec's byte order
    pub fn encode(&self, buffer: &mut [u8], value: i32, index: usize) {
        let le = value.to_le_bytes();
        let target = &mut buffer[index..index + self.bytes];

        for i in 0..self.bytes {
            if self.big_endian {
                target[self.bytes - 1 - i] = le[i];
            } else {
                target[i] = le[i];
            }
        }
    }

    /// Scale a sample by `factor`, rounding to the nearest integer
    #[inline]
    pub fn amplify(sample: i64, factor: f32) -> i64 {
        (sample as f64 * factor as f64).round() as i64
    }

    /// Sum two samples. Clipping happens on write-back.
    #[inline]
    pub fn mix(a: i64, b: i64) -> i64 {
        a + b
    }

    /// Clamp to the range representable at this bit depth
    #[inline]
    pub fn clip(&self, sample: i64) -> i32 {
        sample.clamp(self.min, self.max) as i32
    }

    /// Fill with silence
    pub fn zero(buffer: &mut [u8]) {
        buffer.fill(0);
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn min_value(&self) -> i64 {
        self.min
    }

    pub fn max_value(&self) -> i64 {
        self.max
    }
}

impl Default for SampleCodec {
    /// 16-bit little-endian
    fn default() -> Self {
        Self::new(16, false)
    }
}
