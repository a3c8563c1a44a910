//! Clock driven by a dedicated sleeping thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::pacing::Pacing;
use crate::clock::{Clock, ClockError, TickFn};

/// Wake-ups sent to the clock thread
#[derive(Debug, Clone, Copy)]
enum Signal {
    Wake,
    End,
}

struct Shared {
    callback: TickFn,
    pacing: Mutex<Pacing>,
    counter: AtomicU32,
    running: AtomicBool,
}

impl Shared {
    /// Record a tick and return the delay before the next one
    fn track(&self) -> std::time::Duration {
        let mut pacing = self.pacing.lock();
        let delay = pacing.track(Instant::now());
        let rate = pacing.rate();
        let next = (self.counter.load(Ordering::Relaxed) + 1) % rate;
        self.counter.store(next, Ordering::Relaxed);
        delay
    }
}

/// A clock whose thread runs the callback, then sleeps for the paced delay.
///
/// While paused the thread blocks until [`Clock::start`] or [`ThreadClock::end`].
/// The sleep is a channel receive with a timeout, so ending the clock never
/// waits out a full period.
pub struct ThreadClock {
    shared: Arc<Shared>,
    signal_tx: channel::Sender<Signal>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ThreadClock {
    /// Spawn a paused clock thread named `name`
    pub fn new(name: &str, rate: u32, callback: TickFn) -> Result<Self, ClockError> {
        let shared = Arc::new(Shared {
            callback,
            pacing: Mutex::new(Pacing::new(rate)),
            counter: AtomicU32::new(0),
            running: AtomicBool::new(false),
        });
        let (signal_tx, signal_rx) = channel::unbounded();

        let thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || run(shared, signal_rx))?
        };
        debug!(name, rate, "Clock thread started");

        Ok(Self {
            shared,
            signal_tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Terminate the clock thread and wait for it to exit.
    ///
    /// When called from the clock's own callback the thread is told to exit
    /// but not joined.
    pub fn end(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
        let _ = self.signal_tx.send(Signal::End);

        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run(shared: Arc<Shared>, signal_rx: channel::Receiver<Signal>) {
    loop {
        if !shared.running.load(Ordering::Relaxed) {
            match signal_rx.recv() {
                Ok(Signal::Wake) => continue,
                Ok(Signal::End) | Err(_) => break,
            }
        }
        (shared.callback)();
        let delay = shared.track();
        trace!(?delay, "Clock tick");

        match signal_rx.recv_timeout(delay) {
            Ok(Signal::End) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => {}
        }
    }
    debug!("Clock thread exiting");
}

impl Clock for ThreadClock {
    fn start(&self) {
        if !self.shared.running.swap(true, Ordering::Relaxed) {
            let _ = self.signal_tx.send(Signal::Wake);
        }
    }

    fn pause(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.pause();
        self.shared.pacing.lock().reset();
        self.shared.counter.store(0, Ordering::Relaxed);
    }

    fn tick(&self) {
        (self.shared.callback)();
    }

    fn set_rate(&self, rate: u32) {
        let mut pacing = self.shared.pacing.lock();
        if pacing.set_rate(rate) {
            let wrapped = self.shared.counter.load(Ordering::Relaxed) % pacing.rate();
            self.shared.counter.store(wrapped, Ordering::Relaxed);
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

impl Drop for ThreadClock {
    fn drop(&mut self) {
        self.end();
    }
}
