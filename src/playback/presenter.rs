//! The boundary between a worker and whatever displays it.

use tracing::info;

use crate::playback::state::TransportEvent;

/// Receives transport notifications and status text from a worker
pub trait Presenter: Send + Sync {
    /// A discrete transport state change
    fn event(&self, event: TransportEvent);

    /// Two-line status: an optional new title and the time-code line
    fn status(&self, title: Option<&str>, text: &str);
}

/// Ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn event(&self, _event: TransportEvent) {}

    fn status(&self, _title: Option<&str>, _text: &str) {}
}

/// Logs events and status changes through `tracing`
#[derive(Debug, Default)]
pub struct TracingPresenter {
    last: parking_lot::Mutex<String>,
}

impl Presenter for TracingPresenter {
    fn event(&self, event: TransportEvent) {
        info!(?event, "Transport");
    }

    fn status(&self, title: Option<&str>, text: &str) {
        if let Some(title) = title {
            info!(title, "Opened");
        }
        // Status arrives every tick; only log changes
        let mut last = self.last.lock();
        if *last != text {
            info!(status = text.trim_end(), "Status");
            text.clone_into(&mut last);
        }
    }
}
