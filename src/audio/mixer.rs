//! Software mixer with device pacing.
//!
//! The mixer owns a fixed number of channel slots. Its background loop reads
//! one buffer from every attached track, applies per-channel gain, sums into
//! a shared mix buffer with clipping, applies the master gain and writes the
//! result to the output device.
//!
//! Muted channels, and channels excluded by solo, are skipped by the same
//! byte count instead of read so that every track keeps advancing in step.
//! Before each write the loop sleeps in short naps until the device has
//! drained enough of its buffer, so playback speed follows the hardware.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::audio::codec::SampleCodec;
use crate::audio::device::{nap_length, OutputBackend, OutputDevice};
use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;
use crate::audio::params::ChannelParameters;
use crate::audio::track::SharedTrack;

/// Mix buffer size in bytes when none is given
pub const DEFAULT_BUFFER_SIZE: usize = 4800;

/// Channel count when none is given
pub const DEFAULT_CAPACITY: usize = 8;

/// Device buffer size, in mix buffers, used by [`AudioMixer::open`]
pub const DEVICE_BUFFERS: usize = 4;

/// Mix buffer sizes are a multiple of this many bytes so that every sample
/// width and channel count up to 4 bytes and 12 channels divides them
const BUFFER_ALIGNMENT: usize = 48;

struct Slots {
    sources: Vec<Option<SharedTrack>>,
    params: Vec<ChannelParameters>,
    /// Where the next free/attached search begins
    index: usize,
}

impl Slots {
    fn validate(&self, channel: usize) -> Result<(), AudioError> {
        if channel < self.sources.len() {
            Ok(())
        } else {
            Err(AudioError::ChannelOutOfRange {
                channel,
                capacity: self.sources.len(),
            })
        }
    }

    /// Round-robin search from `index`, advancing it past the hit
    fn next_channel(&mut self, free: bool) -> Option<usize> {
        let len = self.sources.len();
        let found = (0..len)
            .map(|i| (self.index + i) % len)
            .find(|&c| self.sources[c].is_none() == free)?;
        self.index = (found + 1) % len;
        Some(found)
    }
}

struct Buffers {
    read: Vec<u8>,
    mixed: Vec<u8>,
}

struct Shared {
    format: AudioFormat,
    codec: SampleCodec,
    slots: Mutex<Slots>,
    master: Mutex<ChannelParameters>,
    /// Soloed channel, negative when none
    solo: AtomicI32,
    hold: Mutex<bool>,
    hold_changed: Condvar,
    shutdown: AtomicBool,
    dead: AtomicBool,
    death_cause: Mutex<Option<Arc<AudioError>>>,
    device: Mutex<Option<Box<dyn OutputDevice>>>,
    buffers: Mutex<Buffers>,
    nap: Duration,
}

impl Shared {
    fn solo(&self) -> Option<usize> {
        usize::try_from(self.solo.load(Ordering::Relaxed)).ok()
    }

    fn die(&self, cause: AudioError) {
        match &cause {
            AudioError::Closed(_) => debug!("Mixer closed"),
            other => warn!(error = %other, "Mixer died"),
        }
        self.dead.store(true, Ordering::Relaxed);
        *self.death_cause.lock() = Some(Arc::new(cause));
    }

    /// Block while held, flushing the device once on entry
    fn wait_while_held(&self) {
        let mut hold = self.hold.lock();
        if *hold {
            if let Some(device) = self.device.lock().as_mut() {
                device.flush();
            }
        }
        while *hold && !self.shutdown.load(Ordering::Relaxed) {
            self.hold_changed.wait(&mut hold);
        }
    }

    fn mix_cycle(&self) -> Result<(), AudioError> {
        let solo = self.solo();
        let master = *self.master.lock();
        let (sources, params) = {
            let slots = self.slots.lock();
            (slots.sources.clone(), slots.params.clone())
        };

        let mut buffers = self.buffers.lock();
        let Buffers { read, mixed } = &mut *buffers;

        for (channel, (source, params)) in sources.iter().zip(&params).enumerate() {
            let Some(source) = source else {
                continue;
            };
            let mut track = source.lock();
            if track.is_done() || track.is_dead() {
                continue;
            }
            if params.is_muted() || solo.is_some_and(|s| s != channel) {
                track.skip(read.len() as u64);
                continue;
            }
            let big_endian = track.format().big_endian;
            let got = track.read(read);
            drop(track);

            if got.is_some() && !master.is_muted() {
                self.mix_into(mixed, read, big_endian, params.amplification());
            }
        }
        self.apply_master(mixed, master.amplification());

        self.wait_for_device(mixed.len());
        let mut device = self.device.lock();
        let device = device.as_mut().ok_or(AudioError::Closed("Output device"))?;
        device.write(mixed)?;
        SampleCodec::zero(mixed);
        Ok(())
    }

    /// Sum `read`, scaled by `gain`, into `mixed` with clipping
    fn mix_into(&self, mixed: &mut [u8], read: &[u8], big_endian: bool, gain: f32) {
        let codec = self.codec;
        let step = codec.bytes_per_sample();

        for i in (0..mixed.len() / step).map(|k| k * step) {
            let sample = SampleCodec::amplify(codec.decode(read, i, big_endian) as i64, gain);
            let sum = SampleCodec::mix(sample, codec.decode_native(mixed, i) as i64);
            codec.encode(mixed, codec.clip(sum), i);
        }
    }

    fn apply_master(&self, mixed: &mut [u8], gain: f32) {
        let codec = self.codec;
        let step = codec.bytes_per_sample();

        for i in (0..mixed.len() / step).map(|k| k * step) {
            let sample = SampleCodec::amplify(codec.decode_native(mixed, i) as i64, gain);
            codec.encode(mixed, codec.clip(sample), i);
        }
    }

    /// Nap until at most one mix buffer is still queued in the device
    fn wait_for_device(&self, mix_len: usize) {
        loop {
            let ready = match self.device.lock().as_ref() {
                Some(device) => {
                    let threshold = device.buffer_size().saturating_sub(mix_len).max(mix_len);
                    device.available() >= threshold.min(device.buffer_size())
                }
                None => true,
            };
            if ready || self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(self.nap);
        }
    }
}

fn run(shared: Arc<Shared>) {
    info!(
        sample_rate = shared.format.sample_rate,
        channels = shared.slots.lock().sources.len(),
        "Mixer thread started"
    );
    while !shared.shutdown.load(Ordering::Relaxed) && !shared.dead.load(Ordering::Relaxed) {
        shared.wait_while_held();
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        if let Err(e) = shared.mix_cycle() {
            shared.die(e);
        }
    }
    debug!("Mixer thread exiting");
}

/// Multi-channel software mixer writing to one output device
pub struct AudioMixer {
    shared: Arc<Shared>,
    buffer_size: usize,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AudioMixer {
    /// Create a mixer writing to `device`
    pub fn new(
        capacity: usize,
        format: AudioFormat,
        buffer_size: usize,
        device: Box<dyn OutputDevice>,
    ) -> Self {
        Self::with_device(capacity, format, buffer_size, Ok(device))
    }

    /// Create a mixer on a freshly opened device of the given kind.
    ///
    /// The device gets room for [`DEVICE_BUFFERS`] mix buffers. If it fails
    /// to open, the mixer is dead from the start.
    pub fn open(
        capacity: usize,
        format: AudioFormat,
        buffer_size: usize,
        backend: OutputBackend,
    ) -> Self {
        let buffer_size = normalize_buffer_size(buffer_size);
        let device = backend.open(format, buffer_size * DEVICE_BUFFERS);
        Self::with_device(capacity, format, buffer_size, device)
    }

    /// Create a mixer over the result of opening a device. A failed open
    /// leaves the mixer dead with the failure as its cause.
    pub fn with_device(
        capacity: usize,
        format: AudioFormat,
        buffer_size: usize,
        device: Result<Box<dyn OutputDevice>, AudioError>,
    ) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        let buffer_size = normalize_buffer_size(buffer_size);
        let codec = format.codec();

        let shared = Arc::new(Shared {
            format,
            codec,
            slots: Mutex::new(Slots {
                sources: vec![None; capacity],
                params: vec![ChannelParameters::default(); capacity],
                index: 0,
            }),
            master: Mutex::new(ChannelParameters::default()),
            solo: AtomicI32::new(-1),
            hold: Mutex::new(true),
            hold_changed: Condvar::new(),
            shutdown: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            death_cause: Mutex::new(None),
            device: Mutex::new(None),
            buffers: Mutex::new(Buffers {
                read: vec![0; buffer_size],
                mixed: vec![0; buffer_size],
            }),
            nap: nap_length(buffer_size, format),
        });
        match device {
            Ok(device) => *shared.device.lock() = Some(device),
            Err(e) => shared.die(e),
        }

        Self {
            shared,
            buffer_size,
            thread: Mutex::new(None),
        }
    }

    /// Spawn the mixing loop. The mixer starts held.
    pub fn start(&self) -> Result<(), AudioError> {
        if self.is_dead() {
            warn!("Not starting a dead mixer");
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("mixer".into())
            .spawn(move || run(shared))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Run one mixing cycle on the calling thread
    pub fn mix_cycle(&self) -> Result<(), AudioError> {
        if self.is_dead() {
            return Err(AudioError::Closed("Mixer"));
        }
        self.shared.mix_cycle()
    }

    /// Attach to the next free channel, or `None` if all are taken
    pub fn attach(&self, track: SharedTrack) -> Option<usize> {
        let mut slots = self.shared.slots.lock();
        let channel = slots.next_channel(true)?;
        slots.sources[channel] = Some(track);
        Some(channel)
    }

    /// Attach to a specific channel, which must be free
    pub fn attach_at(&self, track: SharedTrack, channel: usize) -> Result<(), AudioError> {
        let mut slots = self.shared.slots.lock();
        slots.validate(channel)?;
        if slots.sources[channel].is_some() {
            return Err(AudioError::ChannelNotFree(channel));
        }
        slots.sources[channel] = Some(track);
        Ok(())
    }

    /// Attach to a channel, returning whatever occupied it
    pub fn attach_and_replace(
        &self,
        track: SharedTrack,
        channel: usize,
    ) -> Result<Option<SharedTrack>, AudioError> {
        let mut slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(slots.sources[channel].replace(track))
    }

    /// Empty a channel, returning its track
    pub fn detach(&self, channel: usize) -> Result<Option<SharedTrack>, AudioError> {
        let mut slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(slots.sources[channel].take())
    }

    pub fn detach_all(&self) {
        self.shared.slots.lock().sources.iter_mut().for_each(|s| *s = None);
    }

    /// Move every attached track back to its first byte
    pub fn rewind_all(&self) {
        let sources = self.shared.slots.lock().sources.clone();
        for track in sources.iter().flatten() {
            track.lock().jump_to_start();
        }
    }

    /// Restore default gain and mute on every channel (not the master)
    pub fn reset_all_parameters(&self) {
        self.shared
            .slots
            .lock()
            .params
            .iter_mut()
            .for_each(ChannelParameters::reset);
    }

    /// Next free channel in round-robin order
    pub fn free_channel(&self) -> Option<usize> {
        self.shared.slots.lock().next_channel(true)
    }

    /// Next attached channel in round-robin order
    pub fn attached_channel(&self) -> Option<usize> {
        self.shared.slots.lock().next_channel(false)
    }

    pub fn is_channel_free(&self, channel: usize) -> Result<bool, AudioError> {
        let slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(slots.sources[channel].is_none())
    }

    pub fn channel(&self, channel: usize) -> Result<Option<SharedTrack>, AudioError> {
        let slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(slots.sources[channel].clone())
    }

    /// Snapshot of every slot
    pub fn channels(&self) -> Vec<Option<SharedTrack>> {
        self.shared.slots.lock().sources.clone()
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.lock().sources.len()
    }

    pub fn channel_parameters(&self, channel: usize) -> Result<ChannelParameters, AudioError> {
        let slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(slots.params[channel])
    }

    /// Modify one channel's parameters in place
    pub fn update_channel_parameters<R>(
        &self,
        channel: usize,
        f: impl FnOnce(&mut ChannelParameters) -> R,
    ) -> Result<R, AudioError> {
        let mut slots = self.shared.slots.lock();
        slots.validate(channel)?;
        Ok(f(&mut slots.params[channel]))
    }

    pub fn master_parameters(&self) -> ChannelParameters {
        *self.shared.master.lock()
    }

    pub fn master_amplification(&self) -> f32 {
        self.shared.master.lock().amplification()
    }

    pub fn set_master_amplification(&self, amplification: f32) {
        self.shared.master.lock().set_amplification(amplification);
    }

    pub fn is_master_muted(&self) -> bool {
        self.shared.master.lock().is_muted()
    }

    pub fn set_master_muted(&self, muted: bool) {
        self.shared.master.lock().set_muted(muted);
    }

    /// Flip the master mute, returning the new state
    pub fn toggle_master_muted(&self) -> bool {
        self.shared.master.lock().toggle_muted()
    }

    /// Restrict output to one channel, or `None` to hear all
    pub fn set_solo(&self, channel: Option<usize>) {
        let value = channel.and_then(|c| i32::try_from(c).ok()).unwrap_or(-1);
        self.shared.solo.store(value, Ordering::Relaxed);
    }

    pub fn solo(&self) -> Option<usize> {
        self.shared.solo()
    }

    pub fn is_solo(&self) -> bool {
        self.solo().is_some()
    }

    /// Hold or release the mixing loop. Holding flushes the device.
    pub fn set_hold(&self, hold: bool) {
        let mut state = self.shared.hold.lock();
        *state = hold;
        self.shared.hold_changed.notify_all();
    }

    pub fn is_hold(&self) -> bool {
        *self.shared.hold.lock()
    }

    /// Ask the mixing loop to exit at its next check
    pub fn interrupt(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        let _hold = self.shared.hold.lock();
        self.shared.hold_changed.notify_all();
    }

    /// Stop the loop, release the device, and mark the mixer dead
    pub fn close(&self) {
        self.interrupt();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        if let Some(mut device) = self.shared.device.lock().take() {
            device.flush();
            device.close();
        }
        if !self.is_dead() {
            self.shared.die(AudioError::Closed("Mixer"));
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.shared.format
    }

    /// Mix buffer size in bytes
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn nap_length(&self) -> Duration {
        self.shared.nap
    }

    pub fn is_dead(&self) -> bool {
        self.shared.dead.load(Ordering::Relaxed)
    }

    pub fn death_cause(&self) -> Option<Arc<AudioError>> {
        self.shared.death_cause.lock().clone()
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.interrupt();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Round down to a multiple of [`BUFFER_ALIGNMENT`]; zero selects the default
fn normalize_buffer_size(buffer_size: usize) -> usize {
    match buffer_size - buffer_size % BUFFER_ALIGNMENT {
        0 => DEFAULT_BUFFER_SIZE,
        size => size,
    }
}
