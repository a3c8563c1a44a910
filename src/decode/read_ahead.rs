//! Bounded read-ahead buffering.
//!
//! A [`ReadAheadBuffer`] runs a [`Producer`] on its own thread and keeps up
//! to `capacity` produced items queued for the consumer. The producer blocks
//! while the queue is full and wakes whenever the consumer takes an item.
//!
//! After a seek the consumer calls [`ReadAheadBuffer::call`]: the producer
//! drops everything it queued, recomputes where to produce from, and starts
//! over. [`ReadAheadBuffer::wait_ready`] blocks until that restart has
//! happened and at least one fresh item is queued.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::decode::decoder::DecodeError;

/// Items buffered when no capacity is given
pub const DEFAULT_CAPACITY: usize = 4;

/// Error that ends production for good
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The application-specific half of a read-ahead buffer
pub trait Producer: Send + 'static {
    type Item: Send + 'static;

    /// Recompute production parameters after a reset request
    fn restart(&mut self);

    /// Whether there is anything to produce from the current parameters
    fn ready(&self) -> bool;

    /// Produce the next item. An error kills the buffer.
    fn produce(&mut self) -> Result<Self::Item, BufferError>;
}

struct State<T> {
    queue: VecDeque<T>,
    reset: bool,
    dead: bool,
    death_cause: Option<Arc<BufferError>>,
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
    capacity: usize,
}

/// A bounded queue filled by a background producer thread
pub struct ReadAheadBuffer<T> {
    shared: Arc<Shared<T>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<T: Send + 'static> ReadAheadBuffer<T> {
    /// Create an idle buffer. A capacity of 0 selects [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    reset: false,
                    dead: false,
                    death_cause: None,
                    shutdown: false,
                }),
                changed: Condvar::new(),
                capacity,
            }),
            thread: Mutex::new(None),
        }
    }

    /// Start producing on a thread named `name`.
    ///
    /// The producer is restarted once before the first item so that it picks
    /// up its initial parameters.
    pub fn start<P>(&self, name: &str, producer: P) -> io::Result<()>
    where
        P: Producer<Item = T>,
    {
        let shared = Arc::clone(&self.shared);
        shared.state.lock().reset = true;
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || produce_loop(shared, producer))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Take the oldest item, waking the producer
    pub fn poll(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        let out = state.queue.pop_front();
        self.shared.changed.notify_all();
        out
    }

    /// Drop the oldest item, waking the producer
    pub fn discard(&self) {
        self.poll();
    }

    /// Drop every queued item without waking anyone
    pub fn clear(&self) {
        self.shared.state.lock().queue.clear();
    }

    /// Inspect the oldest item without removing it
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.shared.state.lock().queue.front().map(f)
    }

    /// Ask the producer to drop its queue and restart from fresh parameters
    pub fn call(&self) {
        let mut state = self.shared.state.lock();
        state.reset = true;
        self.shared.changed.notify_all();
    }

    /// Block until a pending restart has been handled and an item is queued.
    ///
    /// Returns early if the buffer dies or is interrupted.
    pub fn wait_ready(&self) {
        let mut state = self.shared.state.lock();
        while (state.reset || state.queue.is_empty()) && !state.dead && !state.shutdown {
            self.shared.changed.wait(&mut state);
        }
    }

    /// Stop the producer thread at its next wake-up
    pub fn interrupt(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.changed.notify_all();
    }

    /// Interrupt and wait for the producer thread to exit
    pub fn join(&self) {
        self.interrupt();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn used(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn free(&self) -> usize {
        self.shared.capacity - self.used()
    }

    pub fn is_dead(&self) -> bool {
        self.shared.state.lock().dead
    }

    pub fn death_cause(&self) -> Option<Arc<BufferError>> {
        self.shared.state.lock().death_cause.clone()
    }
}

impl<T> Drop for ReadAheadBuffer<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.changed.notify_all();
    }
}

fn produce_loop<P: Producer>(shared: Arc<Shared<P::Item>>, mut producer: P) {
    loop {
        {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown || state.dead {
                    debug!("Read-ahead producer exiting");
                    return;
                }
                if state.reset {
                    state.queue.clear();
                    state.reset = false;
                    producer.restart();
                    continue;
                }
                if state.queue.len() >= shared.capacity || !producer.ready() {
                    shared.changed.wait(&mut state);
                    continue;
                }
                break;
            }
        }

        // Production may be slow; run it unlocked
        let item = producer.produce();

        let mut state = shared.state.lock();
        if state.reset || state.shutdown {
            continue;
        }
        match item {
            Ok(item) => state.queue.push_back(item),
            Err(e) => {
                warn!(error = %e, "Read-ahead producer died");
                state.dead = true;
                state.death_cause = Some(Arc::new(e));
            }
        }
        shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts upward from a shared starting point
    struct Counter {
        start: Arc<AtomicI32>,
        next: i32,
        limit: i32,
        produced: Arc<AtomicUsize>,
        fail_at: Option<i32>,
    }

    impl Producer for Counter {
        type Item = i32;

        fn restart(&mut self) {
            self.next = self.start.load(Ordering::Relaxed);
        }

        fn ready(&self) -> bool {
            self.next < self.limit
        }

        fn produce(&mut self) -> Result<i32, BufferError> {
            if self.fail_at == Some(self.next) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone").into());
            }
            self.produced.fetch_add(1, Ordering::Relaxed);
            let out = self.next;
            self.next += 1;
            Ok(out)
        }
    }

    fn counter(limit: i32, fail_at: Option<i32>) -> (Counter, Arc<AtomicI32>, Arc<AtomicUsize>) {
        let start = Arc::new(AtomicI32::new(0));
        let produced = Arc::new(AtomicUsize::new(0));
        let c = Counter {
            start: Arc::clone(&start),
            next: 0,
            limit,
            produced: Arc::clone(&produced),
            fail_at,
        };
        (c, start, produced)
    }

    #[test]
    fn test_fills_to_capacity() {
        let buffer = ReadAheadBuffer::new(3);
        let (producer, _, produced) = counter(100, None);
        buffer.start("test-lens", producer).unwrap();
        buffer.wait_ready();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(buffer.used(), 3);
        assert_eq!(buffer.free(), 0);
        assert_eq!(produced.load(Ordering::Relaxed), 3);

        assert_eq!(buffer.poll(), Some(0));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.used(), 3);
        assert_eq!(buffer.peek_with(|v| *v), Some(1));
        buffer.join();
    }

    #[test]
    fn test_poll_never_exceeds_production() {
        let buffer = ReadAheadBuffer::new(4);
        let (producer, _, produced) = counter(5, None);
        buffer.start("test-lens", producer).unwrap();
        buffer.wait_ready();

        let mut taken = Vec::new();
        for _ in 0..20 {
            if let Some(v) = buffer.poll() {
                taken.push(v);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(taken, vec![0, 1, 2, 3, 4]);
        assert!(taken.len() <= produced.load(Ordering::Relaxed));
        buffer.join();
    }

    #[test]
    fn test_call_restarts_from_new_parameters() {
        let buffer = ReadAheadBuffer::new(4);
        let (producer, start, _) = counter(100, None);
        buffer.start("test-lens", producer).unwrap();
        buffer.wait_ready();
        assert_eq!(buffer.peek_with(|v| *v), Some(0));

        start.store(50, Ordering::Relaxed);
        buffer.call();
        buffer.wait_ready();
        assert_eq!(buffer.poll(), Some(50));
        buffer.join();
    }

    #[test]
    fn test_default_capacity() {
        let buffer: ReadAheadBuffer<i32> = ReadAheadBuffer::new(0);
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_death_keeps_buffered_items() {
        let buffer = ReadAheadBuffer::new(8);
        let (producer, _, _) = counter(100, Some(2));
        buffer.start("test-lens", producer).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert!(buffer.is_dead());
        assert!(matches!(
            buffer.death_cause().as_deref(),
            Some(BufferError::Io(_))
        ));
        assert_eq!(buffer.poll(), Some(0));
        assert_eq!(buffer.poll(), Some(1));
        assert_eq!(buffer.poll(), None);

        // dead buffers never block a waiting consumer
        buffer.call();
        buffer.wait_ready();
        buffer.join();
    }

    #[test]
    fn test_idle_when_out_of_range() {
        let buffer = ReadAheadBuffer::new(4);
        let (producer, start, _) = counter(10, None);
        start.store(10, Ordering::Relaxed);
        buffer.start("test-lens", producer).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(buffer.used(), 0);

        start.store(8, Ordering::Relaxed);
        buffer.call();
        buffer.wait_ready();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(buffer.used(), 2);
        buffer.join();
    }

    #[test]
    fn test_interrupt_releases_waiters() {
        let buffer = Arc::new(ReadAheadBuffer::<i32>::new(4));
        let waiter = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || buffer.wait_ready())
        };
        std::thread::sleep(Duration::from_millis(20));
        buffer.interrupt();
        waiter.join().unwrap();
    }
}
