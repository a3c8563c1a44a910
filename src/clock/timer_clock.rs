//! Clock scheduled on a shared tokio runtime.
//!
//! Many clocks can share one runtime. Each clock is a task that sleeps for
//! its current delay, fires, and stores the corrected delay for the next
//! round; nothing else about the schedule changes between firings.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::debug;

use crate::clock::pacing::Pacing;
use crate::clock::{Clock, TickFn};

struct Shared {
    callback: TickFn,
    pacing: Mutex<Pacing>,
    counter: AtomicU32,
    /// Delay before the next firing, in milliseconds
    delay_ms: AtomicU64,
    running: AtomicBool,
    fire_now: AtomicBool,
    ended: AtomicBool,
    wake: Notify,
}

impl Shared {
    fn fire(&self) {
        (self.callback)();

        let mut pacing = self.pacing.lock();
        let delay = pacing.track(Instant::now());
        let next = (self.counter.load(Ordering::Relaxed) + 1) % pacing.rate();
        self.counter.store(next, Ordering::Relaxed);
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }
}

/// A clock whose firings are timer tasks on a tokio runtime
pub struct TimerClock {
    shared: Arc<Shared>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TimerClock {
    /// Create a paused clock on the runtime behind `handle`
    pub fn new(handle: &Handle, rate: u32, callback: TickFn) -> Self {
        let shared = Arc::new(Shared {
            callback,
            pacing: Mutex::new(Pacing::new(rate)),
            counter: AtomicU32::new(0),
            delay_ms: AtomicU64::new(0),
            running: AtomicBool::new(false),
            fire_now: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let task = handle.spawn(run(Arc::clone(&shared)));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Cancel the pending firing and fire again right away
    pub fn restart(&self) {
        self.shared.running.store(true, Ordering::Relaxed);
        self.shared.fire_now.store(true, Ordering::Relaxed);
        self.shared.wake.notify_one();
    }

    /// Stop the timer task for good
    pub fn end(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.ended.store(true, Ordering::Relaxed);
        self.shared.wake.notify_one();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        if shared.ended.load(Ordering::Relaxed) {
            break;
        }
        if !shared.running.load(Ordering::Relaxed) {
            shared.wake.notified().await;
            continue;
        }
        let delay = Duration::from_millis(shared.delay_ms.load(Ordering::Relaxed));
        let woken = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shared.wake.notified() => true,
        };
        if woken && !shared.fire_now.swap(false, Ordering::Relaxed) {
            continue;
        }
        if shared.running.load(Ordering::Relaxed) && !shared.ended.load(Ordering::Relaxed) {
            shared.fire();
        }
    }
    debug!("Timer clock task exiting");
}

impl Clock for TimerClock {
    fn start(&self) {
        if !self.shared.running.swap(true, Ordering::Relaxed) {
            self.shared.wake.notify_one();
        }
    }

    fn pause(&self) {
        if self.shared.running.swap(false, Ordering::Relaxed) {
            self.shared.wake.notify_one();
        }
    }

    fn stop(&self) {
        self.pause();
        self.shared.pacing.lock().reset();
        self.shared.counter.store(0, Ordering::Relaxed);
        self.shared.delay_ms.store(0, Ordering::Relaxed);
    }

    fn tick(&self) {
        (self.shared.callback)();
    }

    fn set_rate(&self, rate: u32) {
        let mut pacing = self.shared.pacing.lock();
        if pacing.set_rate(rate) {
            let wrapped = self.shared.counter.load(Ordering::Relaxed) % pacing.rate();
            self.shared.counter.store(wrapped, Ordering::Relaxed);
            self.shared
                .delay_ms
                .store(pacing.delay().as_millis() as u64, Ordering::Relaxed);
        }
    }

    fn rate(&self) -> u32 {
        self.shared.pacing.lock().rate()
    }

    fn counter(&self) -> u32 {
        self.shared.counter.load(Ordering::Relaxed)
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }
}

impl Drop for TimerClock {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    fn counting_clock(handle: &Handle, rate: u32) -> (TimerClock, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let callback: TickFn = {
            let ticks = Arc::clone(&ticks);
            Arc::new(move || {
                ticks.fetch_add(1, Ordering::Relaxed);
            })
        };
        (TimerClock::new(handle, rate, callback), ticks)
    }

    #[test]
    fn test_fires_near_rate() {
        let rt = runtime();
        let (clock, ticks) = counting_clock(rt.handle(), 50);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ticks.load(Ordering::Relaxed), 0);

        clock.start();
        std::thread::sleep(Duration::from_millis(500));
        clock.pause();
        let fired = ticks.load(Ordering::Relaxed);
        // 25 expected
        assert!((12..=32).contains(&fired), "fired {}", fired);
        assert!(clock.counter() < 50);
    }

    #[test]
    fn test_pause_holds_and_stop_resets() {
        let rt = runtime();
        let (clock, ticks) = counting_clock(rt.handle(), 100);
        clock.start();
        std::thread::sleep(Duration::from_millis(100));
        clock.pause();
        std::thread::sleep(Duration::from_millis(30));
        let paused_at = ticks.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(ticks.load(Ordering::Relaxed), paused_at);

        clock.stop();
        assert_eq!(clock.counter(), 0);
    }

    #[test]
    fn test_restart_fires_immediately() {
        let rt = runtime();
        let (clock, ticks) = counting_clock(rt.handle(), 1);
        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        let before = ticks.load(Ordering::Relaxed);

        clock.restart();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn test_end_stops_firing() {
        let rt = runtime();
        let (clock, ticks) = counting_clock(rt.handle(), 200);
        clock.start();
        std::thread::sleep(Duration::from_millis(50));
        clock.end();
        std::thread::sleep(Duration::from_millis(20));
        let ended_at = ticks.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::Relaxed), ended_at);
        assert!(!clock.is_running());
    }
}
