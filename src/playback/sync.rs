//! Audio/video synchronization.
//!
//! The pilot track is the master clock: at the start of each second of
//! normal play the video position is recomputed from how far the pilot has
//! played. Seeking works the other way round, moving every track to the
//! byte offset matching a video position.

use crate::audio::mixer::AudioMixer;
use crate::audio::track::SharedTrack;

/// Frame matching `percent` of a sequence starting at `start` with
/// `length` frames
pub fn frame_for_percent(percent: f64, start: i32, length: i32) -> i32 {
    (percent * (length - 1) as f64).floor() as i32 + start
}

/// Byte offset matching `percent` of a stream, aligned down to whole
/// sample frames of `frame_size` bytes
pub fn audio_offset(percent: f64, stream_size: u64, frame_size: usize) -> u64 {
    let offset = (percent.clamp(0.0, 1.0) * stream_size as f64).round() as u64;
    let frame_size = frame_size.max(1) as u64;
    offset - offset % frame_size
}

/// Keeps the tracks of a sequence aligned with its video position
pub struct SyncController {
    pilot: Option<SharedTrack>,
    tracks: Vec<Option<SharedTrack>>,
}

impl SyncController {
    /// The pilot is the first present track
    pub fn new(tracks: Vec<Option<SharedTrack>>) -> Self {
        let pilot = tracks.iter().flatten().next().cloned();
        Self { pilot, tracks }
    }

    pub fn pilot(&self) -> Option<&SharedTrack> {
        self.pilot.as_ref()
    }

    pub fn tracks(&self) -> &[Option<SharedTrack>] {
        &self.tracks
    }

    /// Frame the pilot says the video should be on, if there is a pilot
    pub fn video_position(&self, start: i32, length: i32) -> Option<i32> {
        let percent = self.pilot.as_ref()?.lock().elapsed_percent();
        Some(frame_for_percent(percent, start, length))
    }

    /// Rewind every track, then skip each to `percent` of its data
    pub fn align_audio(&self, mixer: &AudioMixer, percent: f64) {
        mixer.rewind_all();
        let Some(pilot) = &self.pilot else {
            return;
        };
        let frame_size = pilot.lock().format().frame_size();
        for track in self.tracks.iter().flatten() {
            let mut track = track.lock();
            let offset = audio_offset(percent, track.stream_size(), frame_size);
            track.skip(offset);
        }
    }

    /// Release every track
    pub fn close(&self) {
        for track in self.tracks.iter().flatten() {
            track.lock().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use crate::audio::track::AudioTrackReader;

    fn track(bytes: usize) -> SharedTrack {
        AudioTrackReader::from_bytes(vec![0; bytes], AudioFormat::CDDA).into_shared()
    }

    #[test]
    fn test_frame_for_percent() {
        assert_eq!(frame_for_percent(0.0, 10, 101), 10);
        assert_eq!(frame_for_percent(0.5, 10, 101), 60);
        assert_eq!(frame_for_percent(1.0, 10, 101), 110);
        assert_eq!(frame_for_percent(0.999, 0, 11), 9);
    }

    #[test]
    fn test_audio_offset_aligns_to_frames() {
        assert_eq!(audio_offset(0.5, 4000, 4), 2000);
        assert_eq!(audio_offset(0.3333, 1000, 4), 332);
        assert_eq!(audio_offset(2.0, 1000, 4), 1000);
    }

    #[test]
    fn test_pilot_is_first_present_track() {
        let second = track(400);
        let sync = SyncController::new(vec![None, Some(second.clone()), Some(track(800))]);
        assert!(std::sync::Arc::ptr_eq(sync.pilot().unwrap(), &second));

        assert_eq!(SyncController::new(vec![None]).video_position(0, 10), None);
    }

    #[test]
    fn test_video_position_follows_pilot() {
        let pilot = track(4000);
        let sync = SyncController::new(vec![Some(pilot.clone())]);
        assert_eq!(sync.video_position(1, 101), Some(1));
        pilot.lock().skip(2000);
        assert_eq!(sync.video_position(1, 101), Some(51));
    }

    #[test]
    fn test_align_audio_moves_every_track() {
        use crate::audio::device::NullDevice;

        let a = track(4000);
        let b = track(8000);
        let mixer = AudioMixer::new(
            2,
            AudioFormat::CDDA,
            480,
            Box::new(NullDevice::new(AudioFormat::CDDA, 1920)),
        );
        mixer.attach_at(a.clone(), 0).unwrap();
        mixer.attach_at(b.clone(), 1).unwrap();
        a.lock().skip(100);

        let sync = SyncController::new(vec![Some(a.clone()), Some(b.clone())]);
        sync.align_audio(&mixer, 0.25);
        assert_eq!(a.lock().position(), Some(1000));
        assert_eq!(b.lock().position(), Some(2000));

        sync.close();
        assert!(a.lock().is_dead());
        assert_eq!(b.lock().position(), None);
    }
}
