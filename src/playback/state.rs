//! Transport modes and the events reported for them.
//!
//! Every motion mode maps to a signed per-tick skip for the sequence
//! cursor: negative values play backward, magnitudes above one scan.

/// Skip while scanning backward
pub const FAST_REWIND: i32 = -4;
/// Skip while playing backward at normal speed
pub const TRICKPLAY: i32 = -1;
/// Skip while paused or stopped
pub const PAUSE: i32 = 0;
/// Skip while playing
pub const PLAY: i32 = 1;
/// Skip while scanning forward
pub const FAST_FORWARD: i32 = 4;

/// Discrete notifications sent to the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    Idle,
    Play,
    Pause,
    FastRewind,
    FastForward,
    Trickplay,
    Close,
    Mute,
    Unmute,
    /// Audio output or frame reading failed; motion has been halted
    Error,
}

impl TransportEvent {
    pub fn muted(muted: bool) -> Self {
        if muted {
            TransportEvent::Mute
        } else {
            TransportEvent::Unmute
        }
    }
}

/// Status line shown once playback has failed
pub fn error_status(cause: &str) -> String {
    format!("ERROR {}", cause)
}

/// Transport state machine modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Stopped at the start
    #[default]
    Idle,
    Play,
    Pause,
    FastRewind,
    FastForward,
    Trickplay,
}

impl TransportMode {
    /// Per-tick cursor step in this mode
    pub fn skip(self) -> i32 {
        match self {
            TransportMode::Idle | TransportMode::Pause => PAUSE,
            TransportMode::Play => PLAY,
            TransportMode::FastRewind => FAST_REWIND,
            TransportMode::FastForward => FAST_FORWARD,
            TransportMode::Trickplay => TRICKPLAY,
        }
    }

    /// Event announcing entry into this mode
    pub fn event(self) -> TransportEvent {
        match self {
            TransportMode::Idle => TransportEvent::Idle,
            TransportMode::Play => TransportEvent::Play,
            TransportMode::Pause => TransportEvent::Pause,
            TransportMode::FastRewind => TransportEvent::FastRewind,
            TransportMode::FastForward => TransportEvent::FastForward,
            TransportMode::Trickplay => TransportEvent::Trickplay,
        }
    }

    /// Whether the clocks run in this mode
    pub fn is_moving(self) -> bool {
        self.skip() != PAUSE
    }

    /// Audio is only heard during normal forward play
    pub fn holds_audio(self) -> bool {
        self != TransportMode::Play
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_skips() {
        assert_eq!(TransportMode::FastRewind.skip(), -4);
        assert_eq!(TransportMode::Trickplay.skip(), -1);
        assert_eq!(TransportMode::Pause.skip(), 0);
        assert_eq!(TransportMode::Idle.skip(), 0);
        assert_eq!(TransportMode::Play.skip(), 1);
        assert_eq!(TransportMode::FastForward.skip(), 4);
    }

    #[test]
    fn test_audio_hold() {
        assert!(!TransportMode::Play.holds_audio());
        assert!(TransportMode::FastForward.holds_audio());
        assert!(TransportMode::Trickplay.is_moving());
        assert!(!TransportMode::Pause.is_moving());
    }

    #[test]
    fn test_events() {
        assert_eq!(TransportMode::Idle.event(), TransportEvent::Idle);
        assert_eq!(TransportEvent::muted(true), TransportEvent::Mute);
        assert_eq!(TransportEvent::muted(false), TransportEvent::Unmute);
        assert_eq!(error_status("Mixer closed"), "ERROR Mixer closed");
    }
}
