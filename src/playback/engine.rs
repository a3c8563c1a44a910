//! Frame-sequence playback worker.
//!
//! A [`FrameSequenceWorker`] plays one sequence directory: numbered image
//! files decoded ahead of time by a group of [`FrameLens`]es, plus up to 127
//! numbered WAV tracks mixed by an [`AudioMixer`]. Two clocks drive it. The
//! render clock only pulls frames out of the lenses; the logic clock moves
//! the cursor, keeps the video on the pilot track's time, parks the cursor
//! at the sequence bounds and reports status.
//!
//! The freezing variant adds a [`FreezeTracker`]: the transport then moves
//! an unfrozen position and the displayed frame holds still over the
//! sequence's freeze intervals.
//!
//! Every transport operation runs under the state lock. Logic ticks take
//! the same lock, so operations only fire one after releasing it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::audio::error::AudioError;
use crate::audio::format::AudioFormat;
use crate::audio::mixer::AudioMixer;
use crate::audio::track::{AudioTrackReader, SharedTrack};
use crate::clock::{Clock, ClockError, ThreadClock, TickFn, TimerClock};
use crate::config::PlayerConfig;
use crate::core::sequence::{FileFrameSequence, SequenceCursor};
use crate::core::time::format_time_code;
use crate::decode::decoder::{FrameDecoder, ImageFrameDecoder};
use crate::decode::frame_lens::{FrameLens, LensParams, SharedLensParams};
use crate::playback::freeze::{FreezeTracker, FreezeTransition};
use crate::playback::metadata::{self, MalformedSequence};
use crate::playback::presenter::{NullPresenter, Presenter};
use crate::playback::state::{error_status, TransportEvent, TransportMode, PAUSE, PLAY};
use crate::playback::sync::SyncController;
use crate::render::renderer::{FrameSink, MultiLensRenderer, NullSink};

/// Highest audio channel number looked up in a sequence directory
pub const MAX_TRACKS: usize = 127;

/// Error type for opening a worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Malformed sequence: {0}")]
    Malformed(#[from] MalformedSequence),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
}

/// Transport contract shared by every worker
pub trait SequenceWorker: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn fast_rewind(&self);
    fn fast_forward(&self);
    /// Play backward at normal speed
    fn trick_play(&self);
    fn step_backward(&self);
    fn step_forward(&self);
    fn jump_to_start(&self);
    fn jump_to_end(&self);

    /// Move to `point`. Returns `false` if it lies outside the sequence.
    fn jump(&self, point: i32) -> bool;

    /// Tear down every thread and release every resource
    fn dismiss(&self);

    /// Directory the worker plays from
    fn path(&self) -> &Path;

    /// Snapshot of the cursor
    fn sequence(&self) -> SequenceCursor;

    fn mode(&self) -> TransportMode;

    fn mixer(&self) -> &AudioMixer;

    fn presenter(&self) -> &dyn Presenter;

    fn amplification(&self) -> f32 {
        self.mixer().master_amplification()
    }

    fn set_amplification(&self, amplification: f32) {
        self.mixer().set_master_amplification(amplification);
    }

    fn is_muted(&self) -> bool {
        self.mixer().is_master_muted()
    }

    fn set_muted(&self, muted: bool) {
        self.mixer().set_master_muted(muted);
        self.presenter().event(TransportEvent::muted(muted));
    }

    fn toggle_muted(&self) -> bool {
        let muted = self.mixer().toggle_master_muted();
        self.presenter().event(TransportEvent::muted(muted));
        muted
    }

    /// Soloed track number, counting from 1; 0 when every track plays
    fn track(&self) -> usize {
        self.mixer().solo().map_or(0, |channel| channel + 1)
    }

    /// Solo track `track`, counting from 1; 0 plays every track
    fn set_track(&self, track: usize) {
        self.mixer().set_solo(track.checked_sub(1));
    }

    /// Number of track slots
    fn tracks(&self) -> usize {
        self.mixer().capacity()
    }
}

/// Collaborators a worker presents through and decodes with
pub struct WorkerContext {
    pub presenter: Arc<dyn Presenter>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub sink: Box<dyn FrameSink>,
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self {
            presenter: Arc::new(NullPresenter),
            decoder: Arc::new(ImageFrameDecoder),
            sink: Box::new(NullSink),
        }
    }
}

/// Open `path`, leaving the slot empty when the file is missing or
/// unreadable
pub(crate) fn load_track(path: &Path) -> Option<SharedTrack> {
    if !path.is_file() {
        return None;
    }
    match AudioTrackReader::open(path) {
        Ok(track) => Some(track.into_shared()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable track");
            None
        }
    }
}

/// Load `1.wav` to `127.wav`, dropping empty slots after the last track.
///
/// Tracks whose format differs from the first one cannot be mixed with it
/// and are skipped.
fn load_tracks(dir: &Path) -> Vec<Option<SharedTrack>> {
    let mut tracks: Vec<Option<SharedTrack>> = (1..=MAX_TRACKS)
        .map(|n| load_track(&dir.join(format!("{}.wav", n))))
        .collect();

    let mut pilot_format: Option<AudioFormat> = None;
    for (channel, slot) in tracks.iter_mut().enumerate() {
        let Some(track) = slot else { continue };
        let format = track.lock().format();
        match pilot_format {
            None => pilot_format = Some(format),
            Some(pilot) if pilot != format => {
                warn!(track = channel + 1, ?format, ?pilot, "Skipping track in a different format");
                *slot = None;
            }
            Some(_) => {}
        }
    }
    while matches!(tracks.last(), Some(None)) {
        tracks.pop();
    }
    tracks
}

struct TransportState {
    sequence: FileFrameSequence,
    freeze: Option<FreezeTracker>,
    mode: TransportMode,
}

impl TransportState {
    /// Fraction of the sequence the audio should be at
    fn playback_percent(&self) -> f64 {
        match &self.freeze {
            Some(tracker) => {
                let elapsed = tracker.position() - self.sequence.start();
                elapsed as f64 / (self.sequence.end() - self.sequence.start()) as f64
            }
            None => self.sequence.elapsed_percent(),
        }
    }

    /// Skip of the transport mode, which a frozen cursor does not follow
    fn mode_skip(&self) -> i32 {
        self.mode.skip()
    }

    fn status_text(&self) -> String {
        match &self.freeze {
            Some(tracker) => {
                let marker = if tracker.is_freezing() { '.' } else { ' ' };
                let elapsed = (tracker.position() - self.sequence.start()) as f64
                    / self.sequence.rate() as f64;
                format!("{}{}", marker, format_time_code(elapsed))
            }
            None => format_time_code(self.sequence.elapsed_seconds()),
        }
    }
}

/// Plays a file-per-frame sequence with its audio tracks
pub struct FrameSequenceWorker {
    dir: PathBuf,
    presenter: Arc<dyn Presenter>,
    state: Mutex<TransportState>,
    lens_params: SharedLensParams,
    lenses: Arc<[FrameLens]>,
    renderer: Arc<MultiLensRenderer>,
    sync: SyncController,
    mixer: AudioMixer,
    render_clock: ThreadClock,
    logic_clock: TimerClock,
    runtime: Mutex<Option<Runtime>>,
    /// Whether the mixer had a device at open; a silent mixer never fails
    audio_live: bool,
    failed: AtomicBool,
    dismissed: AtomicBool,
}

impl FrameSequenceWorker {
    /// Open a plain sequence directory and park it at its first frame
    pub fn open(
        dir: impl Into<PathBuf>,
        config: &PlayerConfig,
        ctx: WorkerContext,
    ) -> Result<Arc<Self>, WorkerError> {
        Self::build(dir.into(), config, ctx, false)
    }

    /// Open a sequence whose metadata lists freeze intervals
    pub fn open_freezing(
        dir: impl Into<PathBuf>,
        config: &PlayerConfig,
        ctx: WorkerContext,
    ) -> Result<Arc<Self>, WorkerError> {
        Self::build(dir.into(), config, ctx, true)
    }

    fn build(
        dir: PathBuf,
        config: &PlayerConfig,
        ctx: WorkerContext,
        freezing: bool,
    ) -> Result<Arc<Self>, WorkerError> {
        let map = metadata::read_metadata(&dir)??;
        let sequence = metadata::parse_file_sequence(&map)?;
        let freeze = if freezing {
            let intervals = metadata::parse_freeze_points(&map, sequence.cursor())?;
            Some(FreezeTracker::new(intervals, sequence.point()))
        } else {
            None
        };

        let tracks = load_tracks(&dir);
        let sync = SyncController::new(tracks.clone());
        let (capacity, format) = match sync.pilot() {
            Some(pilot) => (tracks.len(), pilot.lock().format()),
            None => (1, AudioFormat::CDDA),
        };
        let mixer = AudioMixer::open(capacity, format, config.buffer_size, config.output);
        for (channel, track) in tracks.iter().enumerate() {
            if let Some(track) = track {
                mixer.attach_at(Arc::clone(track), channel)?;
            }
        }
        mixer.set_solo(Some(0));
        if let Some(cause) = mixer.death_cause() {
            warn!(error = %cause, "Audio output unavailable, playing silently");
        }
        let audio_live = !mixer.is_dead();

        // One lens keeps a frozen frame from being decoded K times over
        let lens_count = if freezing { 1 } else { config.lenses.max(1) };
        let lens_params: SharedLensParams = Arc::new(Mutex::new(LensParams {
            point: sequence.point(),
            skip: sequence.skip(),
        }));
        let lenses: Arc<[FrameLens]> =
            FrameLens::group(&lens_params, lens_count, config.lens_capacity).into();
        for lens in lenses.iter() {
            lens.start(dir.clone(), sequence.clone(), lens_count, Arc::clone(&ctx.decoder))?;
        }

        let renderer = Arc::new(MultiLensRenderer::new(Arc::clone(&lenses), ctx.sink));
        let rate = config.rate_for(sequence.rate());
        let render_clock = {
            let renderer = Arc::clone(&renderer);
            let tick: TickFn = Arc::new(move || renderer.update());
            ThreadClock::new("render-clock", rate, tick)?
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("logic-clock")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        info!(
            dir = %dir.display(),
            name = sequence.name(),
            frames = sequence.length(),
            rate,
            tracks = tracks.iter().flatten().count(),
            lenses = lens_count,
            freezing,
            "Opened sequence"
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
                presenter: ctx.presenter,
                state: Mutex::new(TransportState {
                    sequence,
                    freeze,
                    mode: TransportMode::Idle,
                }),
                lens_params,
                lenses,
                renderer,
                sync,
                mixer,
                render_clock,
                logic_clock: TimerClock::new(&handle, rate, tick),
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
        self.await_lenses();
        self.renderer.update();
        self.presenter.event(TransportEvent::Idle);
        self.presenter
            .status(Some(state.sequence.name()), &state.status_text());
        Ok(())
    }

    /// One logic tick
    fn update(&self) {
        if self.is_dismissed() {
            return;
        }
        let counter = self.logic_clock.counter();
        let mut guard = self.state.lock();
        if self.is_dismissed() {
            return;
        }
        let state = &mut *guard;
        if let Some(cause) = self.failure() {
            self.halt(state, &cause);
            return;
        }

        let resync = self.resync_position(state, counter);
        if state.freeze.is_some() {
            let (position, sync) = match resync {
                Some(position) => (position, true),
                None => {
                    let next = state.freeze.as_ref().map_or(0, FreezeTracker::next_position);
                    (next, false)
                }
            };
            self.advance_frozen(state, position, sync);
        } else {
            let (frame, sync) = match resync {
                Some(frame) => (frame, true),
                None => (
                    state.sequence.point().saturating_add(state.sequence.skip()),
                    false,
                ),
            };
            if !state.sequence.set_point(frame) {
                self.park(state);
            } else if sync {
                self.call_lenses(&state.sequence);
            }
        }
        self.report_status(state, counter);
    }

    /// Cause of a mixer or lens that died while the worker was live
    fn failure(&self) -> Option<String> {
        if self.audio_live && self.mixer.is_dead() {
            let cause = self
                .mixer
                .death_cause()
                .map_or_else(|| "Audio output lost".to_owned(), |e| e.to_string());
            return Some(cause);
        }
        self.lenses.iter().find(|lens| lens.is_dead()).map(|lens| {
            lens.death_cause()
                .map_or_else(|| "Frame reader lost".to_owned(), |e| e.to_string())
        })
    }

    /// Stop motion after a failure and report it once
    fn halt(&self, state: &mut TransportState, cause: &str) {
        if state.mode.is_moving() {
            self.pause_locked(state, false);
        }
        if !self.failed.swap(true, Ordering::AcqRel) {
            error!(error = cause, point = state.sequence.point(), "Playback failed");
            self.presenter.event(TransportEvent::Error);
        }
        self.presenter.status(None, &error_status(cause));
    }

    /// Whether a mixer or lens failure has halted playback
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Video position from the pilot on the first tick of each second of
    /// forward play
    fn resync_position(&self, state: &TransportState, counter: u32) -> Option<i32> {
        if counter != 0 || state.mode_skip() != PLAY {
            return None;
        }
        let position = self
            .sync
            .video_position(state.sequence.start(), state.sequence.length())?;
        debug!(position, "Resynchronizing video to pilot track");
        Some(position)
    }

    /// Move the unfrozen position and show the frame it maps to
    fn advance_frozen(&self, state: &mut TransportState, position: i32, sync: bool) {
        let TransportState { sequence, freeze, .. } = &mut *state;
        let Some(tracker) = freeze.as_mut() else {
            return;
        };
        let step = tracker.resolve(position, sequence.cursor());
        let mut sync = sync;
        match step.transition {
            Some(FreezeTransition::Freeze) => {
                debug!(frame = step.frame, position, "Freezing");
                sequence.set_skip(PAUSE);
                sync = true;
            }
            Some(FreezeTransition::Thaw) => {
                debug!(position, "Thawing");
                sequence.set_skip(tracker.skip());
                sync = true;
            }
            None => {}
        }

        if sequence.set_point(step.frame) {
            tracker.set_position(position);
            if sync {
                self.call_lenses(sequence);
            }
        } else {
            Self::snap_to_bound(sequence);
            tracker.set_position(sequence.point());
            self.park(state);
        }
    }

    fn snap_to_bound(sequence: &mut FileFrameSequence) {
        if sequence.elapsed_percent() < 0.5 {
            sequence.go_to_start();
        } else {
            sequence.go_to_end();
        }
    }

    /// Stop at the nearer bound and show its frame
    fn park(&self, state: &mut TransportState) {
        Self::snap_to_bound(&mut state.sequence);
        if let Some(tracker) = state.freeze.as_mut() {
            tracker.set_freezing(false);
        }
        debug!(point = state.sequence.point(), "Reached sequence bound");
        self.pause_locked(state, true);
        self.await_lenses();
        self.renderer.update();
    }

    fn report_status(&self, state: &TransportState, counter: u32) {
        let half_second = (self.logic_clock.rate() / 2).max(1);
        if state.mode_skip() != PLAY || counter % half_second == 0 {
            self.presenter.status(None, &state.status_text());
        }
    }

    /// Restart every lens from the cursor
    fn call_lenses(&self, sequence: &SequenceCursor) {
        *self.lens_params.lock() = LensParams {
            point: sequence.point(),
            skip: sequence.skip(),
        };
        for lens in self.lenses.iter() {
            lens.call();
        }
    }

    fn await_lenses(&self) {
        for lens in self.lenses.iter() {
            lens.wait_ready();
        }
    }

    fn align_audio(&self, state: &TransportState) {
        self.sync.align_audio(&self.mixer, state.playback_percent());
    }

    /// Switch mode and move the cursor at the mode's skip, unless frozen
    fn set_mode(&self, state: &mut TransportState, mode: TransportMode) {
        state.mode = mode;
        let skip = mode.skip();
        if let Some(tracker) = state.freeze.as_mut() {
            tracker.set_skip(skip);
            if tracker.is_freezing() {
                return;
            }
        }
        state.sequence.set_skip(skip);
        self.call_lenses(&state.sequence);
    }

    fn start_motion(&self, mode: TransportMode) {
        if self.is_dismissed() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(cause) = self.failure() {
            self.halt(&mut state, &cause);
            return;
        }
        if mode == TransportMode::Play {
            self.align_audio(&state);
        }
        self.set_mode(&mut state, mode);
        self.render_clock.start();
        self.logic_clock.start();
        self.mixer.set_hold(mode.holds_audio());
        info!(?mode, point = state.sequence.point(), "Transport");
        self.presenter.event(mode.event());
    }

    fn pause_locked(&self, state: &mut TransportState, on_bound: bool) {
        if !on_bound {
            if let Some(frame) = self.renderer.frame() {
                state.sequence.set_point(frame);
                if let Some(tracker) = state.freeze.as_mut() {
                    if !tracker.is_freezing() {
                        tracker.set_position(frame);
                    }
                }
            }
        }
        self.set_mode(state, TransportMode::Pause);
        self.render_clock.pause();
        self.logic_clock.pause();
        self.mixer.set_hold(true);
        info!(point = state.sequence.point(), on_bound, "Paused");
        self.presenter.event(TransportEvent::Pause);
    }

    /// Jump under the lock. Returns whether the jump happened and whether a
    /// logic tick should follow once the lock is released.
    fn jump_locked(&self, state: &mut TransportState, point: i32) -> (bool, bool) {
        if !state.sequence.is_valid_point(point) {
            return (false, false);
        }
        if state.freeze.is_some() {
            self.advance_frozen(state, point, true);
        } else {
            state.sequence.set_point(point);
            self.call_lenses(&state.sequence);
        }
        let paused = !state.mode.is_moving();
        if paused {
            self.await_lenses();
            self.renderer.update();
        }
        self.align_audio(state);
        (true, paused)
    }

    fn jump_to_bound(&self, end: bool) {
        if self.is_dismissed() {
            return;
        }
        let tick = {
            let mut state = self.state.lock();
            let point = if end {
                state.sequence.end()
            } else {
                state.sequence.start()
            };
            if let Some(tracker) = state.freeze.as_mut() {
                tracker.set_freezing(false);
                let skip = tracker.skip();
                state.sequence.set_skip(skip);
            }
            self.jump_locked(&mut state, point).1
        };
        if tick {
            self.logic_clock.tick();
        }
    }

    fn step(&self, direction: i32) {
        if self.is_dismissed() {
            return;
        }
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.mode.is_moving() {
                return;
            }
            match state.freeze.as_ref().map(FreezeTracker::position) {
                Some(position) => {
                    let target = position.saturating_add(direction);
                    if !state.sequence.is_valid_point(target) {
                        return;
                    }
                    self.advance_frozen(state, target, true);
                }
                None => {
                    let target = state.sequence.point().saturating_add(direction);
                    if !state.sequence.set_point(target) {
                        return;
                    }
                    self.call_lenses(&state.sequence);
                }
            }
            self.await_lenses();
            self.renderer.update();
        }
        self.logic_clock.tick();
    }

    fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::Acquire)
    }

    /// Frame currently on screen
    pub fn displayed_frame(&self) -> Option<i32> {
        self.renderer.frame()
    }

    pub fn renderer(&self) -> &MultiLensRenderer {
        &self.renderer
    }

    pub fn lens_count(&self) -> usize {
        self.lenses.len()
    }

    /// Where a freezing sequence would be without its freezes
    pub fn unfrozen_position(&self) -> Option<i32> {
        self.state.lock().freeze.as_ref().map(FreezeTracker::position)
    }

    /// Whether the displayed frame is currently held
    pub fn is_frozen(&self) -> bool {
        self.state
            .lock()
            .freeze
            .as_ref()
            .is_some_and(FreezeTracker::is_freezing)
    }

    /// Current status line
    pub fn status_text(&self) -> String {
        self.state.lock().status_text()
    }

    /// Run one logic tick on the calling thread
    pub fn tick(&self) {
        self.logic_clock.tick();
    }
}

impl SequenceWorker for FrameSequenceWorker {
    fn play(&self) {
        self.start_motion(TransportMode::Play);
    }

    fn pause(&self) {
        if self.is_dismissed() {
            return;
        }
        let mut state = self.state.lock();
        self.pause_locked(&mut state, false);
    }

    fn stop(&self) {
        if self.is_dismissed() {
            return;
        }
        {
            let mut state = self.state.lock();
            if let Some(tracker) = state.freeze.as_mut() {
                tracker.set_freezing(false);
                tracker.set_skip(PAUSE);
            }
            self.set_mode(&mut state, TransportMode::Idle);
            self.render_clock.stop();
            self.logic_clock.stop();
            self.mixer.set_hold(true);
            let start = state.sequence.start();
            self.jump_locked(&mut state, start);
            info!("Stopped");
            self.presenter.event(TransportEvent::Idle);
        }
        self.logic_clock.tick();
    }

    fn fast_rewind(&self) {
        self.start_motion(TransportMode::FastRewind);
    }

    fn fast_forward(&self) {
        self.start_motion(TransportMode::FastForward);
    }

    fn trick_play(&self) {
        self.start_motion(TransportMode::Trickplay);
    }

    fn step_backward(&self) {
        self.step(-1);
    }

    fn step_forward(&self) {
        self.step(1);
    }

    fn jump_to_start(&self) {
        self.jump_to_bound(false);
    }

    fn jump_to_end(&self) {
        self.jump_to_bound(true);
    }

    fn jump(&self, point: i32) -> bool {
        if self.is_dismissed() {
            return false;
        }
        let (jumped, tick) = {
            let mut state = self.state.lock();
            self.jump_locked(&mut state, point)
        };
        if tick {
            self.logic_clock.tick();
        }
        jumped
    }

    fn dismiss(&self) {
        let _state = self.state.lock();
        if self.dismissed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.mixer.interrupt();
        for lens in self.lenses.iter() {
            lens.interrupt();
        }
        self.render_clock.stop();
        self.render_clock.end();
        self.logic_clock.end();
        self.mixer.close();
        self.sync.close();
        for lens in self.lenses.iter() {
            lens.join();
        }
        self.renderer.clear();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        info!(dir = %self.dir.display(), "Dismissed sequence");
        self.presenter.event(TransportEvent::Close);
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    fn sequence(&self) -> SequenceCursor {
        self.state.lock().sequence.cursor().clone()
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
}

impl Drop for FrameSequenceWorker {
    fn drop(&mut self) {
        self.logic_clock.end();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}
