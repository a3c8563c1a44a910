//! Sequential music playback.
//!
//! A [`MusicPlaylistWorker`] treats each point of its sequence as one
//! whole-file track (`<point>.wav`). Only the current track is heard: it is
//! attached to one of three rotating mixer channels and soloed. Scanning
//! moves through the current file in coarse byte skips and crosses into
//! the neighbouring tracks at either end.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::audio::format::AudioFormat;
use crate::audio::mixer::AudioMixer;
use crate::audio::track::SharedTrack;
use crate::clock::{Clock, TickFn, TimerClock};
use crate::config::PlayerConfig;
use crate::core::sequence::SequenceCursor;
use crate::core::time::format_minutes;
use crate::playback::engine::{load_track, SequenceWorker, WorkerError};
use crate::playback::metadata;
use crate::playback::presenter::Presenter;
use crate::playback::state::{error_status, TransportEvent, TransportMode, FAST_FORWARD};

/// Logic ticks per second
pub const PLAYLIST_RATE: u32 = 50;

/// Mixer channels the tracks rotate through
pub const PLAYLIST_CHANNELS: usize = 3;

/// Mixer buffer size in bytes
pub const PLAYLIST_BUFFER_SIZE: usize = 9600;

/// Sample frames skipped per scan tick, before the scan multiplier
const SCAN_FRAMES: u64 = 4800;

/// Status updates during play, in ticks
const STATUS_INTERVAL: u32 = PLAYLIST_RATE / 2;

struct PlaylistState {
    cursor: SequenceCursor,
    /// Channel the next track goes to
    channel: usize,
    mode: TransportMode,
}

/// Plays one audio file per sequence point, one after another
pub struct MusicPlaylistWorker {
    dir: PathBuf,
    presenter: Arc<dyn Presenter>,
    state: Mutex<PlaylistState>,
    tracks: Vec<Option<SharedTrack>>,
    mixer: AudioMixer,
    clock: TimerClock,
    runtime: Mutex<Option<Runtime>>,
    audio_live: bool,
    failed: AtomicBool,
    dismissed: AtomicBool,
}

impl MusicPlaylistWorker {
    /// Open a playlist directory and cue its first available track
    pub fn open(
        dir: impl Into<PathBuf>,
        config: &PlayerConfig,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Arc<Self>, WorkerError> {
        let dir = dir.into();
        let map = metadata::read_metadata(&dir)??;
        let mut cursor = metadata::parse_cursor(&map)?;

        let tracks: Vec<Option<SharedTrack>> = (cursor.start()..=cursor.end())
            .map(|n| load_track(&dir.join(format!("{}.wav", n))))
            .collect();
        let first = tracks.iter().position(Option::is_some);
        if let Some(index) = first {
            cursor.set_point(cursor.start() + index as i32);
        }

        let format = first
            .and_then(|index| tracks[index].as_ref())
            .map_or(AudioFormat::CDDA, |track| track.lock().format());
        let mixer = AudioMixer::open(PLAYLIST_CHANNELS, format, PLAYLIST_BUFFER_SIZE, config.output);
        if let Some(track) = first.and_then(|index| tracks[index].as_ref()) {
            mixer.attach_at(Arc::clone(track), 0)?;
        }
        mixer.set_solo(Some(0));
        if let Some(cause) = mixer.death_cause() {
            warn!(error = %cause, "Audio output unavailable, playing silently");
        }
        let audio_live = !mixer.is_dead();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("playlist-clock")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        info!(
            dir = %dir.display(),
            name = cursor.name(),
            tracks = tracks.iter().flatten().count(),
            "Opened playlist"
        );

        let worker = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let tick: TickFn = Arc::new(move || {
                if let Some(worker) = weak.upgrade() {
                    worker.update();
                }
            });
            Self {
                dir,
                presenter,
                state: Mutex::new(PlaylistState {
                    cursor,
                    channel: 1,
                    mode: TransportMode::Idle,
                }),
                tracks,
                mixer,
                clock: TimerClock::new(&handle, PLAYLIST_RATE, tick),
                runtime: Mutex::new(Some(runtime)),
                audio_live,
                failed: AtomicBool::new(false),
                dismissed: AtomicBool::new(false),
            }
        });
        worker.initialize()?;
        Ok(worker)
    }

    fn initialize(&self) -> Result<(), WorkerError> {
        self.mixer.start()?;
        let state = self.state.lock();
        self.presenter.event(TransportEvent::Idle);
        self.presenter
            .status(Some(state.cursor.name()), &self.status_text(&state.cursor));
        Ok(())
    }

    fn track_at(&self, cursor: &SequenceCursor, point: i32) -> Option<&SharedTrack> {
        let index = usize::try_from(point - cursor.start()).ok()?;
        self.tracks.get(index)?.as_ref()
    }

    fn current_track(&self, cursor: &SequenceCursor) -> Option<&SharedTrack> {
        self.track_at(cursor, cursor.point())
    }

    fn status_text(&self, cursor: &SequenceCursor) -> String {
        let time = self
            .current_track(cursor)
            .map(|track| format_minutes(track.lock().elapsed_seconds()));
        track_status(cursor.point(), time.as_deref())
    }

    fn report_status(&self, cursor: &SequenceCursor) {
        self.presenter.status(None, &self.status_text(cursor));
    }

    /// Bytes skipped per scan tick on `track`
    fn scan_bytes(track: &SharedTrack) -> u64 {
        let frame_size = track.lock().format().frame_size() as u64;
        frame_size * SCAN_FRAMES * FAST_FORWARD as u64
    }

    /// One logic tick
    fn update(&self) {
        if self.is_dismissed() {
            return;
        }
        let counter = self.clock.counter();
        let mut guard = self.state.lock();
        if self.is_dismissed() {
            return;
        }
        let state = &mut *guard;
        if let Some(cause) = self.failure() {
            self.halt(state, &cause);
            return;
        }

        // A missing track counts as finished so forward play moves past it
        let done = self.current_track(&state.cursor).map_or(true, |track| {
            let track = track.lock();
            track.is_done() || track.is_dead()
        });
        if state.mode.skip() > 0 && done {
            if state.cursor.point() >= state.cursor.end() {
                self.stop_locked(state);
                self.presenter.status(None, " END");
            } else {
                let next = state.cursor.point() + 1;
                self.jump_locked(state, next);
            }
            return;
        }

        match state.mode {
            TransportMode::Play => {
                if counter % STATUS_INTERVAL == 0 {
                    self.report_status(&state.cursor);
                }
            }
            TransportMode::FastForward => {
                if let Some(track) = self.current_track(&state.cursor) {
                    let amount = Self::scan_bytes(track);
                    track.lock().skip(amount);
                }
                self.report_status(&state.cursor);
            }
            TransportMode::FastRewind => {
                self.rewind_tick(state);
                self.report_status(&state.cursor);
            }
            _ => {}
        }
    }

    /// Cause of an audio output that died while the worker was live
    fn failure(&self) -> Option<String> {
        if !self.audio_live || !self.mixer.is_dead() {
            return None;
        }
        let cause = self
            .mixer
            .death_cause()
            .map_or_else(|| "Audio output lost".to_owned(), |e| e.to_string());
        Some(cause)
    }

    /// Stop motion after a failure and report it once
    fn halt(&self, state: &mut PlaylistState, cause: &str) {
        if state.mode.is_moving() {
            self.pause_locked(state);
        }
        if !self.failed.swap(true, Ordering::AcqRel) {
            error!(error = cause, track = state.cursor.point(), "Playback failed");
            self.presenter.event(TransportEvent::Error);
        }
        self.presenter.status(None, &error_status(cause));
    }

    /// Whether an audio failure has halted playback
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Move back one scan step, crossing into the previous track at the
    /// start of the current one
    fn rewind_tick(&self, state: &mut PlaylistState) {
        let position = self
            .current_track(&state.cursor)
            .and_then(|track| track.lock().position())
            .unwrap_or(0);

        if position == 0 {
            if state.cursor.point() == state.cursor.start() {
                self.pause_locked(state);
                return;
            }
            let previous = state.cursor.point() - 1;
            self.jump_locked(state, previous);
            if let Some(track) = self.current_track(&state.cursor) {
                let amount = Self::scan_bytes(track);
                let mut track = track.lock();
                let offset = track.stream_size().saturating_sub(amount);
                track.skip(offset);
            }
            return;
        }

        if let Some(track) = self.current_track(&state.cursor) {
            let amount = Self::scan_bytes(track);
            let mut track = track.lock();
            track.jump_to_start();
            track.skip(position.saturating_sub(amount));
        }
    }

    fn set_mode(&self, mode: TransportMode) {
        if self.is_dismissed() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(cause) = self.failure() {
            self.halt(&mut state, &cause);
            return;
        }
        state.mode = mode;
        state.cursor.set_skip(mode.skip());
        if mode == TransportMode::Play {
            self.mixer.set_hold(false);
        }
        self.clock.start();
        info!(?mode, track = state.cursor.point(), "Transport");
        self.presenter.event(mode.event());
    }

    fn pause_locked(&self, state: &mut PlaylistState) {
        state.mode = TransportMode::Pause;
        state.cursor.set_skip(0);
        self.mixer.set_hold(true);
        self.clock.pause();
        self.presenter.event(TransportEvent::Pause);
    }

    fn stop_locked(&self, state: &mut PlaylistState) {
        state.mode = TransportMode::Idle;
        state.cursor.set_skip(0);
        self.mixer.set_hold(true);
        self.mixer.rewind_all();
        self.clock.stop();
        self.presenter.event(TransportEvent::Idle);
        let start = state.cursor.start();
        self.jump_locked(state, start);
    }

    /// Cue the track at `point` on the next channel
    fn jump_locked(&self, state: &mut PlaylistState, point: i32) -> bool {
        if point == state.cursor.point() {
            self.report_status(&state.cursor);
            return true;
        }
        if !state.cursor.set_point(point) {
            return false;
        }
        let channel = state.channel;
        let track = self.current_track(&state.cursor).cloned();
        // A track may only sit on one channel at a time
        if let Some(track) = &track {
            for (other, slot) in self.mixer.channels().iter().enumerate() {
                if slot.as_ref().is_some_and(|t| Arc::ptr_eq(t, track)) {
                    let _ = self.mixer.detach(other);
                }
            }
        }
        let result = match track {
            Some(track) => self.mixer.attach_and_replace(track, channel),
            None => self.mixer.detach(channel),
        };
        if let Err(e) = result {
            warn!(channel, error = %e, "Failed to cue track");
        }
        self.mixer.set_solo(Some(channel));
        self.mixer.rewind_all();

        state.channel = (channel + 1) % PLAYLIST_CHANNELS;
        if let Err(e) = self.mixer.detach(state.channel) {
            warn!(channel = state.channel, error = %e, "Failed to free channel");
        }
        debug!(point, channel, "Cued track");
        self.report_status(&state.cursor);
        true
    }

    fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::Acquire)
    }

    /// Current status line
    pub fn status(&self) -> String {
        self.status_text(&self.state.lock().cursor)
    }

    /// Run one logic tick on the calling thread
    pub fn tick(&self) {
        self.clock.tick();
    }

    pub fn current(&self) -> Option<SharedTrack> {
        let state = self.state.lock();
        self.current_track(&state.cursor).cloned()
    }
}

/// `TRACK  <n>  <mm:ss>`, with `E:RR` in place of the time for a missing
/// track
pub fn track_status(point: i32, time: Option<&str>) -> String {
    let pad = if point < 10 { " " } else { "" };
    format!("TRACK  {}  {}{}", point, pad, time.unwrap_or("E:RR"))
}

impl SequenceWorker for MusicPlaylistWorker {
    fn play(&self) {
        self.set_mode(TransportMode::Play);
    }

    fn pause(&self) {
        if self.is_dismissed() {
            return;
        }
        let mut state = self.state.lock();
        self.pause_locked(&mut state);
    }

    fn stop(&self) {
        if self.is_dismissed() {
            return;
        }
        let mut state = self.state.lock();
        self.stop_locked(&mut state);
    }

    fn fast_rewind(&self) {
        self.set_mode(TransportMode::FastRewind);
    }

    fn fast_forward(&self) {
        self.set_mode(TransportMode::FastForward);
    }

    fn trick_play(&self) {}

    fn step_backward(&self) {
        let point = self.state.lock().cursor.point();
        self.jump(point - 1);
    }

    fn step_forward(&self) {
        let point = self.state.lock().cursor.point();
        self.jump(point + 1);
    }

    fn jump_to_start(&self) {
        if self.is_dismissed() {
            return;
        }
        let state = self.state.lock();
        self.mixer.rewind_all();
        self.report_status(&state.cursor);
    }

    fn jump_to_end(&self) {
        self.step_forward();
    }

    fn jump(&self, point: i32) -> bool {
        if self.is_dismissed() {
            return false;
        }
        let mut state = self.state.lock();
        self.jump_locked(&mut state, point)
    }

    fn dismiss(&self) {
        let _state = self.state.lock();
        if self.dismissed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clock.end();
        self.mixer.interrupt();
        self.mixer.close();
        for track in self.tracks.iter().flatten() {
            track.lock().close();
        }
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        info!(dir = %self.dir.display(), "Dismissed playlist");
        self.presenter.event(TransportEvent::Close);
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    fn sequence(&self) -> SequenceCursor {
        self.state.lock().cursor.clone()
    }

    fn mode(&self) -> TransportMode {
        self.state.lock().mode
    }

    fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    fn presenter(&self) -> &dyn Presenter {
        self.presenter.as_ref()
    }

    fn track(&self) -> usize {
        1
    }

    fn set_track(&self, _track: usize) {}

    fn tracks(&self) -> usize {
        1
    }
}

impl Drop for MusicPlaylistWorker {
    fn drop(&mut self) {
        self.clock.end();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}
