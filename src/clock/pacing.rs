//! Tick period correction for millisecond-granular timers.
//!
//! A rate such as 60 Hz has no whole-millisecond period. [`Pacing`] keeps two
//! candidate delays, `floor(1000 / rate)` and `ceil(1000 / rate)`, and picks
//! one after every tick from how long the previous interval really took. A
//! late tick switches to the floor delay, an early one to the ceil delay, so
//! the long-run average settles between the two.

use std::time::{Duration, Instant};

/// Rate used when a requested rate is out of range
pub const DEFAULT_RATE: u32 = 60;

/// Highest accepted rate; one tick per millisecond
pub const MAX_RATE: u32 = 1000;

/// Which of the two delays is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    Floor,
    Ceil,
}

/// Floor/ceil delay selection for one clock
#[derive(Debug, Clone)]
pub struct Pacing {
    rate: u32,
    floor: Duration,
    ceil: Duration,
    mode: PacingMode,
    delay: Duration,
    last: Option<Instant>,
}

impl Pacing {
    /// Create pacing for `rate` ticks per second, falling back to
    /// [`DEFAULT_RATE`] when `rate` is outside `1..=1000`
    pub fn new(rate: u32) -> Self {
        let rate = if is_valid_rate(rate) { rate } else { DEFAULT_RATE };
        let (floor, ceil) = delays(rate);

        Self {
            rate,
            floor,
            ceil,
            mode: PacingMode::Ceil,
            delay: ceil,
            last: None,
        }
    }

    /// Change the rate. Out-of-range rates are ignored and `false` returned.
    pub fn set_rate(&mut self, rate: u32) -> bool {
        if !is_valid_rate(rate) {
            return false;
        }
        let (floor, ceil) = delays(rate);
        self.rate = rate;
        self.floor = floor;
        self.ceil = ceil;
        self.delay = match self.mode {
            PacingMode::Floor => floor,
            PacingMode::Ceil => ceil,
        };
        true
    }

    /// Record a tick at `now` and return the delay until the next one
    pub fn track(&mut self, now: Instant) -> Duration {
        let elapsed = self.last.map(|last| now.saturating_duration_since(last));

        match self.mode {
            PacingMode::Ceil if elapsed.map_or(true, |e| e >= self.ceil) => {
                self.mode = PacingMode::Floor;
                self.delay = self.floor;
            }
            PacingMode::Floor if elapsed.is_some_and(|e| e <= self.floor) => {
                self.mode = PacingMode::Ceil;
                self.delay = self.ceil;
            }
            _ => {}
        }
        self.last = Some(now);
        self.delay
    }

    /// Forget the phase: the next tick is measured from scratch
    pub fn reset(&mut self) {
        self.mode = PacingMode::Ceil;
        self.delay = self.ceil;
        self.last = None;
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    pub fn floor_delay(&self) -> Duration {
        self.floor
    }

    pub fn ceil_delay(&self) -> Duration {
        self.ceil
    }
}

pub fn is_valid_rate(rate: u32) -> bool {
    (1..=MAX_RATE).contains(&rate)
}

fn delays(rate: u32) -> (Duration, Duration) {
    let floor = 1000 / rate;
    let ceil = if 1000 % rate == 0 { floor } else { floor + 1 };
    (
        Duration::from_millis(floor as u64),
        Duration::from_millis(ceil as u64),
    )
}
