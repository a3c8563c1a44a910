//! Time-code helpers shared by the workers.
//! Sequence positions are frame numbers; audio positions are byte offsets.
//! Everything user-facing is rendered from whole seconds.

use std::time::Duration;

/// Whole seconds, as shown on a status counter
pub type Seconds = i64;

/// Largest value an `h:mm:ss` counter can show (9:59:59)
pub const MAX_SECONDS: Seconds = 60 * 60 * 10 - 1;

/// Largest value an `mm:ss` counter can show (99:59)
pub const MAX_MINUTE_SECONDS: Seconds = 99 * 60 + 59;

/// Time constants for conversions
pub mod constants {
    pub const MILLIS_PER_SECOND: u64 = 1_000;
    pub const SECONDS_PER_MINUTE: i64 = 60;
    pub const SECONDS_PER_HOUR: i64 = 3_600;
}

/// Truncate fractional seconds to a displayable counter value.
/// Negative inputs clamp to zero.
#[inline]
pub fn whole_seconds(seconds: f64) -> Seconds {
    if seconds.is_nan() || seconds <= 0.0 {
        0
    } else {
        seconds.floor() as Seconds
    }
}

/// Duration of a single tick at `rate` ticks per second
#[inline]
pub fn tick_period(rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / rate.max(1) as f64)
}

/// Convert a byte count into seconds of audio
#[inline]
pub fn bytes_to_seconds(bytes: u64, frame_size: usize, frame_rate: f64) -> f64 {
    if frame_size == 0 || frame_rate <= 0.0 {
        return 0.0;
    }
    bytes as f64 / (frame_size as f64 * frame_rate)
}

/// Format as `h:mm:ss`, saturating at 9:59:59
pub fn format_time_code(seconds: f64) -> String {
    let total = whole_seconds(seconds).min(MAX_SECONDS);
    let hours = total / constants::SECONDS_PER_HOUR;
    let minutes = (total % constants::SECONDS_PER_HOUR) / constants::SECONDS_PER_MINUTE;
    let secs = total % constants::SECONDS_PER_MINUTE;

    format!("{}:{:02}:{:02}", hours, minutes, secs)
}

/// Format as `mm:ss`, saturating at 99:59
pub fn format_minutes(seconds: f64) -> String {
    let total = whole_seconds(seconds).min(MAX_MINUTE_SECONDS);
    let minutes = total / constants::SECONDS_PER_MINUTE;
    let secs = total % constants::SECONDS_PER_MINUTE;

    format!("{:02}:{:02}", minutes, secs)
}
