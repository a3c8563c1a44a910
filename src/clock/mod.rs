//! Self-correcting fixed-rate clocks.
//!
//! Both realizations share [`Pacing`] for delay selection and expose the
//! same [`Clock`] contract. [`ThreadClock`] sleeps on a dedicated thread;
//! [`TimerClock`] is scheduled on a shared tokio runtime and only adjusts
//! its next delay after each firing.

pub mod pacing;
pub mod thread_clock;
pub mod timer_clock;

use std::sync::Arc;

pub use pacing::{Pacing, PacingMode, DEFAULT_RATE, MAX_RATE};
pub use thread_clock::ThreadClock;
pub use timer_clock::TimerClock;

/// Callback invoked on every tick
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Error type for clock construction
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A periodic tick source
pub trait Clock: Send + Sync {
    /// Begin firing. Has no effect if already running.
    fn start(&self);

    /// Stop firing, keeping the phase counter
    fn pause(&self);

    /// Stop firing and reset the phase counter and delay selection
    fn stop(&self);

    /// Fire once on the calling thread
    fn tick(&self);

    /// Change the rate; values outside `1..=1000` are ignored
    fn set_rate(&self, rate: u32);

    fn rate(&self) -> u32;

    /// Ticks since the last wrap, in `[0, rate)`
    fn counter(&self) -> u32;

    fn is_running(&self) -> bool;
}
