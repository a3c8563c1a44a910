pub mod engine;
pub mod freeze;
pub mod metadata;
pub mod playlist;
pub mod presenter;
pub mod state;
pub mod sync;

pub use engine::{FrameSequenceWorker, SequenceWorker, WorkerContext, WorkerError};
pub use freeze::{FreezeIntervals, FreezeTracker};
pub use metadata::{MalformedSequence, Metadata};
pub use playlist::MusicPlaylistWorker;
pub use presenter::{NullPresenter, Presenter, TracingPresenter};
pub use state::{TransportEvent, TransportMode};
pub use sync::SyncController;
