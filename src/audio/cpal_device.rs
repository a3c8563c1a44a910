//! Output device backed by the default cpal host.
//!
//! The mixer produces interleaved integer PCM bytes; this device converts
//! them to `f32` and hands them to the real-time audio callback through a
//! lock-free ring buffer.
//!
//! # Thread layout
//!
//! - A cpal `Stream` is not `Send` on every platform, so it is built, played
//!   and dropped on a dedicated owner thread. The constructor waits for that
//!   thread to report whether the stream came up.
//! - The mixer thread owns the ring buffer producer and writes to it.
//! - The audio callback owns the consumer. It fills with silence on
//!   underrun and never blocks or allocates.
//!
//! # Flushing
//!
//! The consumer lives inside the callback, so a flush is requested through
//! an atomic flag that the callback checks on its next invocation.
//!
//! # Failure modes
//!
//! Stream errors reported by cpal set a flag; the next write then fails and
//! the mixer goes dead. No sample-rate conversion is done: if the device
//! rejects the track's rate, construction fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam::channel;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info};

use crate::audio::codec::SampleCodec;
use crate::audio::device::OutputDevice;
use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;

/// Audio output through the system's default device
pub struct CpalDevice {
    producer: HeapProd<f32>,
    codec: SampleCodec,
    scale: f32,
    /// Bytes per ring buffer slot
    sample_bytes: usize,
    buffer_size: usize,
    scratch: Vec<f32>,
    flush_requested: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    shutdown_tx: Option<channel::Sender<()>>,
    owner: Option<thread::JoinHandle<()>>,
}

impl CpalDevice {
    /// Open the default output device for `format`, with an internal buffer
    /// of `buffer_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::NoDevice` if no output device is available, or
    /// the cpal error that prevented the stream from starting.
    pub fn open(format: AudioFormat, buffer_size: usize) -> Result<Self, AudioError> {
        let codec = SampleCodec::new(format.bits as u32, format.big_endian);
        let sample_bytes = codec.bytes_per_sample();
        let (producer, consumer) = HeapRb::<f32>::new((buffer_size / sample_bytes).max(1)).split();

        let flush_requested = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let owner = {
            let flush_requested = Arc::clone(&flush_requested);
            let failed = Arc::clone(&failed);
            thread::Builder::new()
                .name("cpal-output".into())
                .spawn(move || {
                    let stream = match build_stream(format, consumer, flush_requested, failed) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    // Keep the stream alive until the device is closed or dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Output stream released");
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = owner.join();
                return Err(e);
            }
            Err(_) => return Err(AudioError::DeviceThread),
        }
        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits = format.bits,
            "Audio output opened"
        );

        Ok(Self {
            producer,
            codec,
            scale: 1.0 / (1u64 << (codec.bits() - 1)) as f32,
            sample_bytes,
            buffer_size,
            scratch: Vec::with_capacity(buffer_size / sample_bytes),
            flush_requested,
            failed,
            shutdown_tx: Some(shutdown_tx),
            owner: Some(owner),
        })
    }
}

fn build_stream(
    format: AudioFormat,
    mut consumer: HeapCons<f32>,
    flush_requested: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if flush_requested.swap(false, Ordering::Relaxed) {
                consumer.clear();
            }
            let n = consumer.pop_slice(data);
            // Underrun: pad with silence
            data[n..].fill(0.0);
        },
        move |err| {
            error!("Audio stream error: {}", err);
            failed.store(true, Ordering::Relaxed);
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

impl OutputDevice for CpalDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, AudioError> {
        if self.shutdown_tx.is_none() {
            return Err(AudioError::Closed("Output device"));
        }
        if self.failed.load(Ordering::Relaxed) {
            return Err(AudioError::DeviceThread);
        }
        let (codec, scale, step) = (self.codec, self.scale, self.sample_bytes);
        self.scratch.clear();
        self.scratch.extend(
            (0..data.len() / step).map(|i| codec.decode_native(data, i * step) as f32 * scale),
        );
        let pushed = self.producer.push_slice(&self.scratch);
        if pushed < self.scratch.len() {
            debug!(dropped = self.scratch.len() - pushed, "Output ring buffer overrun");
        }
        Ok(pushed * self.sample_bytes)
    }

    fn available(&self) -> usize {
        self.producer.vacant_len() * self.sample_bytes
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn flush(&mut self) {
        self.flush_requested.store(true, Ordering::Relaxed);
    }

    fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(owner) = self.owner.take() {
            let _ = owner.join();
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}
