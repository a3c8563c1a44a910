//! Per-channel gain and mute state.

/// Gain applied when nothing else is configured
pub const DEFAULT_AMPLIFICATION: f32 = 1.0;

/// Gain and mute settings of one mixer input or of the master bus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParameters {
    amplification: f32,
    muted: bool,
}

impl ChannelParameters {
    pub fn new(amplification: f32, muted: bool) -> Self {
        Self {
            amplification,
            muted,
        }
    }

    /// Restore unity gain, unmuted
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn amplification(&self) -> f32 {
        self.amplification
    }

    pub fn set_amplification(&mut self, amplification: f32) {
        self.amplification = amplification;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Flip the mute state and return the new one
    pub fn toggle_muted(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self::new(DEFAULT_AMPLIFICATION, false)
    }
}
