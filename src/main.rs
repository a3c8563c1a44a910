//! Command-line player.
//!
//! Opens one sequence directory, plays it to the end and exits. Status and
//! transport changes are logged.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frameplay::playback::{Presenter, TracingPresenter, TransportMode};
use frameplay::{FrameSequenceWorker, MusicPlaylistWorker, PlayerConfig, SequenceWorker, WorkerContext};

/// How often the finished-playback check runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "frameplay")]
#[command(about = "Play a frame sequence or a music playlist")]
#[command(version)]
struct Args {
    /// Sequence directory holding metadata.toml
    dir: PathBuf,

    /// Hold frames over the sequence's freeze intervals
    #[arg(long, conflicts_with = "playlist")]
    freezing: bool,

    /// Play the directory as a playlist of numbered tracks
    #[arg(long)]
    playlist: bool,

    /// Player configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frameplay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    let presenter: Arc<dyn Presenter> = Arc::new(TracingPresenter::default());
    let worker: Arc<dyn SequenceWorker> = if args.playlist {
        MusicPlaylistWorker::open(&args.dir, &config, presenter)
            .with_context(|| format!("Failed to open playlist {}", args.dir.display()))?
    } else {
        let ctx = WorkerContext {
            presenter,
            ..WorkerContext::default()
        };
        let opened = if args.freezing {
            FrameSequenceWorker::open_freezing(&args.dir, &config, ctx)
        } else {
            FrameSequenceWorker::open(&args.dir, &config, ctx)
        };
        opened.with_context(|| format!("Failed to open sequence {}", args.dir.display()))?
    };

    worker.play();
    while worker.mode() != TransportMode::Idle && worker.mode() != TransportMode::Pause {
        thread::sleep(POLL_INTERVAL);
    }

    info!(point = worker.sequence().point(), "Playback finished");
    worker.dismiss();
    Ok(())
}
