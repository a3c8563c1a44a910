pub mod renderer;

pub use renderer::{FrameSink, MultiLensRenderer, NullSink};
