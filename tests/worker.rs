mod common;

use std::sync::Arc;

use common::{
    config, context, wait_until, write_sequence, write_wav, FailingDecoder, RecordingPresenter,
};
use frameplay::playback::{TransportEvent, TransportMode, WorkerError};
use frameplay::{FrameSequenceWorker, SequenceWorker, WorkerContext};

fn open(start: i32, end: i32, rate: i32) -> (tempfile::TempDir, Arc<FrameSequenceWorker>, Arc<RecordingPresenter>) {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), start, end, rate, "");
    let presenter = Arc::new(RecordingPresenter::default());
    let worker = FrameSequenceWorker::open(dir.path(), &config(), context(&presenter)).unwrap();
    (dir, worker, presenter)
}

#[test]
fn test_open_parks_at_first_frame() {
    let (dir, worker, presenter) = open(5, 100, 24);
    assert_eq!(worker.displayed_frame(), Some(5));
    assert_eq!(worker.mode(), TransportMode::Idle);
    assert_eq!(worker.path(), dir.path());
    assert_eq!(worker.lens_count(), 3);
    assert_eq!(presenter.events(), vec![TransportEvent::Idle]);
    assert_eq!(presenter.title.lock().as_deref(), Some("Test"));
    assert_eq!(presenter.last_status().as_deref(), Some("0:00:00"));
    worker.dismiss();
}

#[test]
fn test_open_rejects_bad_directories() {
    let dir = tempfile::tempdir().unwrap();
    let presenter = Arc::new(RecordingPresenter::default());

    let missing = FrameSequenceWorker::open(dir.path(), &config(), context(&presenter));
    assert!(matches!(missing.err(), Some(WorkerError::Io(_))));

    write_sequence(dir.path(), 10, 5, 24, "");
    let backward = FrameSequenceWorker::open(dir.path(), &config(), context(&presenter));
    match backward.err() {
        Some(WorkerError::Malformed(e)) => assert_eq!(e.subject, "Sequence parameters"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(presenter.events().is_empty());
}

#[test]
fn test_steps_and_jumps_while_paused() {
    let (_dir, worker, presenter) = open(0, 240, 24);

    worker.step_backward();
    assert_eq!(worker.sequence().point(), 0);

    worker.step_forward();
    worker.step_forward();
    assert_eq!(worker.sequence().point(), 2);
    assert_eq!(worker.displayed_frame(), Some(2));

    assert!(worker.jump(120));
    assert_eq!(worker.displayed_frame(), Some(120));
    assert_eq!(presenter.last_status().as_deref(), Some("0:00:05"));
    assert!(!worker.jump(241));
    assert_eq!(worker.sequence().point(), 120);

    worker.jump_to_end();
    assert_eq!(worker.displayed_frame(), Some(240));
    worker.jump_to_start();
    assert_eq!(worker.displayed_frame(), Some(0));
    worker.dismiss();
}

#[test]
fn test_play_runs_to_end_and_parks() {
    let (_dir, worker, presenter) = open(0, 30, 200);
    worker.play();
    assert_eq!(worker.mode(), TransportMode::Play);
    assert!(!worker.mixer().is_hold());

    wait_until(|| worker.mode() == TransportMode::Pause);
    assert_eq!(worker.sequence().point(), 30);
    assert_eq!(worker.displayed_frame(), Some(30));
    assert!(worker.mixer().is_hold());
    assert_eq!(
        presenter.events(),
        vec![TransportEvent::Idle, TransportEvent::Play, TransportEvent::Pause]
    );
    worker.dismiss();
}

#[test]
fn test_trick_play_parks_at_start() {
    let (_dir, worker, presenter) = open(0, 30, 200);
    assert!(worker.jump(20));
    worker.trick_play();
    assert!(worker.mixer().is_hold());

    wait_until(|| worker.mode() == TransportMode::Pause);
    assert_eq!(worker.sequence().point(), 0);
    assert_eq!(worker.displayed_frame(), Some(0));
    assert!(presenter.events().contains(&TransportEvent::Trickplay));
    worker.dismiss();
}

#[test]
fn test_pause_holds_displayed_frame() {
    let (_dir, worker, _presenter) = open(0, 10_000, 100);
    worker.fast_forward();
    wait_until(|| worker.displayed_frame().is_some_and(|f| f >= 40));
    worker.pause();

    assert_eq!(worker.mode(), TransportMode::Pause);
    let point = worker.sequence().point();
    assert!(point >= 40);
    assert_eq!(worker.sequence().skip(), 0);
    worker.step_forward();
    assert_eq!(worker.sequence().point(), point + 1);
    worker.dismiss();
}

#[test]
fn test_stop_rewinds() {
    let (_dir, worker, presenter) = open(0, 100, 24);
    assert!(worker.jump(60));
    worker.fast_forward();
    worker.stop();
    assert_eq!(worker.mode(), TransportMode::Idle);
    assert_eq!(worker.sequence().point(), 0);
    assert_eq!(worker.displayed_frame(), Some(0));
    assert_eq!(presenter.events().last(), Some(&TransportEvent::Idle));
    worker.dismiss();
}

#[test]
fn test_mute_and_amplification() {
    let (_dir, worker, presenter) = open(0, 100, 24);
    assert!(worker.toggle_muted());
    assert!(worker.is_muted());
    worker.set_muted(false);
    assert!(!worker.is_muted());
    assert_eq!(
        presenter.events()[1..],
        [TransportEvent::Mute, TransportEvent::Unmute]
    );

    worker.set_amplification(0.5);
    approx::assert_relative_eq!(worker.amplification(), 0.5);
    worker.dismiss();
}

#[test]
fn test_tracks_and_audio_alignment() {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), 0, 100, 24, "");
    write_wav(&dir.path().join("1.wav"), 1000);
    write_wav(&dir.path().join("3.wav"), 3000);
    let presenter = Arc::new(RecordingPresenter::default());
    let worker = FrameSequenceWorker::open(dir.path(), &config(), context(&presenter)).unwrap();

    assert_eq!(worker.tracks(), 3);
    assert_eq!(worker.track(), 1);
    worker.set_track(0);
    assert_eq!(worker.track(), 0);
    worker.set_track(3);
    assert_eq!(worker.track(), 3);

    assert!(worker.jump(50));
    let first = worker.mixer().channel(0).unwrap().unwrap();
    let third = worker.mixer().channel(2).unwrap().unwrap();
    assert!(worker.mixer().channel(1).unwrap().is_none());
    assert_eq!(first.lock().position(), Some(2000));
    assert_eq!(third.lock().position(), Some(6000));

    worker.dismiss();
    assert!(first.lock().is_dead());
    assert!(worker.mixer().is_dead());
}

#[test]
fn test_audio_failure_halts_playback() {
    let (_dir, worker, presenter) = open(0, 100_000, 100);
    worker.play();
    worker.mixer().close();

    wait_until(|| worker.mode() == TransportMode::Pause);
    assert!(worker.has_failed());
    assert_eq!(
        presenter.events(),
        vec![
            TransportEvent::Idle,
            TransportEvent::Play,
            TransportEvent::Pause,
            TransportEvent::Error
        ]
    );
    assert_eq!(presenter.last_status().as_deref(), Some("ERROR Mixer closed"));

    // Motion stays refused and the failure is reported once
    worker.play();
    assert_eq!(worker.mode(), TransportMode::Pause);
    assert_eq!(presenter.events().len(), 4);
    worker.dismiss();
}

#[test]
fn test_frame_read_failure_halts_playback() {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), 0, 1000, 100, "");
    let presenter = Arc::new(RecordingPresenter::default());
    let ctx = WorkerContext {
        decoder: Arc::new(FailingDecoder { from: 40 }),
        ..context(&presenter)
    };
    let worker = FrameSequenceWorker::open(dir.path(), &config(), ctx).unwrap();
    worker.play();

    wait_until(|| worker.has_failed() && worker.mode() == TransportMode::Pause);
    assert!(worker.sequence().point() < 1000);
    assert_eq!(presenter.events().last(), Some(&TransportEvent::Error));
    assert!(presenter
        .last_status()
        .is_some_and(|status| status.starts_with("ERROR")));
    worker.dismiss();
}

#[test]
fn test_dismiss_is_final() {
    let (_dir, worker, presenter) = open(0, 100, 24);
    worker.dismiss();
    worker.dismiss();
    assert_eq!(
        presenter.events(),
        vec![TransportEvent::Idle, TransportEvent::Close]
    );
    assert!(!worker.jump(10));
    worker.play();
    assert_eq!(worker.mode(), TransportMode::Idle);
    assert_eq!(worker.displayed_frame(), None);
}

fn open_freezing(end: i32, rate: i32, points: &str) -> (tempfile::TempDir, Arc<FrameSequenceWorker>, Arc<RecordingPresenter>) {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), 0, end, rate, &format!("freeze_points = \"{}\"", points));
    let presenter = Arc::new(RecordingPresenter::default());
    let worker =
        FrameSequenceWorker::open_freezing(dir.path(), &config(), context(&presenter)).unwrap();
    (dir, worker, presenter)
}

#[test]
fn test_freezing_jumps_and_steps() {
    let (_dir, worker, presenter) = open_freezing(100, 10, "10,20,50,60");
    assert_eq!(worker.lens_count(), 1);
    assert!(!worker.is_frozen());

    assert!(worker.jump(15));
    assert!(worker.is_frozen());
    assert_eq!(worker.displayed_frame(), Some(10));
    assert_eq!(worker.unfrozen_position(), Some(15));
    assert_eq!(presenter.last_status().as_deref(), Some(".0:00:01"));

    worker.step_forward();
    assert_eq!(worker.unfrozen_position(), Some(16));
    assert_eq!(worker.displayed_frame(), Some(10));

    assert!(worker.jump(25));
    assert!(!worker.is_frozen());
    assert_eq!(worker.displayed_frame(), Some(25));
    assert_eq!(presenter.last_status().as_deref(), Some(" 0:00:02"));

    assert!(!worker.jump(101));
    worker.jump_to_start();
    assert_eq!(worker.displayed_frame(), Some(0));
    assert_eq!(worker.unfrozen_position(), Some(0));
    worker.dismiss();
}

#[test]
fn test_freezing_play_passes_through_intervals() {
    let (_dir, worker, _presenter) = open_freezing(40, 100, "10,20");
    worker.play();
    wait_until(|| worker.is_frozen());

    wait_until(|| worker.mode() == TransportMode::Pause);
    assert!(!worker.is_frozen());
    assert_eq!(worker.sequence().point(), 40);
    assert_eq!(worker.unfrozen_position(), Some(40));
    worker.dismiss();
}

#[test]
fn test_freezing_rejects_bad_points() {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), 0, 100, 24, "freeze_points = \"30,20\"");
    let presenter = Arc::new(RecordingPresenter::default());
    let result = FrameSequenceWorker::open_freezing(dir.path(), &config(), context(&presenter));
    match result.err() {
        Some(WorkerError::Malformed(e)) => assert_eq!(e.subject, "Freezing point: 20"),
        other => panic!("unexpected result: {:?}", other),
    }
}
