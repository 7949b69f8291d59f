//! Rip pipeline integration tests against fake tools.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use common::*;
use dr_av::Tool;
use dr_core::{Error, LogLevel, LogSink, ProgressSender};
use tokio_util::sync::CancellationToken;

fn rip_dirs() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let root = tempfile::tempdir().unwrap();
    let scratch = root.path().join("scratch");
    let output = root.path().join("library/Title 1.mkv");
    (root, scratch, output)
}

#[tokio::test]
async fn success_removes_raw_file() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_OK)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, MKVMERGE_OK)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);
    let (progress, rx) = ProgressSender::watch();

    ripper
        .rip("/dev/sr0", 1, &output, &progress, &LogSink::noop(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"MKV");
    assert!(entries(&scratch).is_empty(), "{:?}", entries(&scratch));
    assert_eq!(*rx.borrow(), 97.0);
    assert_eq!(tools.calls(Tool::Mplayer), 0);
    assert_eq!(tools.calls(Tool::Ffmpeg), 0);
}

#[tokio::test]
async fn capture_failure_removes_raw_file() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, FAILS)
        .with(Tool::Mplayer, FAILS)
        .with(Tool::Mkvmerge, MKVMERGE_OK)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);

    let err = ripper
        .rip("/dev/sr0", 1, &output, &ProgressSender::noop(), &LogSink::noop(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(err, Error::Capture(_));
    assert!(entries(&scratch).is_empty());
    assert!(!output.exists());
    assert_eq!(tools.calls(Tool::Mkvmerge), 0);
}

#[tokio::test]
async fn remux_failure_removes_raw_file() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_OK)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, FAILS)
        .with(Tool::Ffmpeg, FAILS);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);
    let (log, mut lines) = LogSink::channel();

    let err = ripper
        .rip("/dev/sr0", 1, &output, &ProgressSender::noop(), &log, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(err, Error::Remux(_));
    assert!(entries(&scratch).is_empty());
    assert_eq!(tools.calls(Tool::Mkvmerge), 1);
    assert_eq!(tools.calls(Tool::Ffmpeg), 1);

    let errors: Vec<String> = std::iter::from_fn(|| lines.try_recv().ok())
        .filter(|l| l.level == LogLevel::Error)
        .map(|l| l.message)
        .collect();
    assert!(errors.last().unwrap().starts_with("Rip of title 1 failed"), "{errors:?}");
}

#[tokio::test]
async fn remux_fallback_produces_output() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_OK)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, FAILS)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);

    ripper
        .rip("/dev/sr0", 1, &output, &ProgressSender::noop(), &LogSink::noop(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"FFMKV");
    assert!(entries(&scratch).is_empty());
}

#[tokio::test]
async fn cancellation_removes_raw_file_and_kills_capture() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_HANGS)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, MKVMERGE_OK)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let (_root, scratch, output) = rip_dirs();
    // Long stall threshold so only cancellation can end the capture.
    let ripper = discrip::Ripper::new(tools.registry(), scratch.clone()).with_capture_timings(
        dr_av::CaptureTimings {
            stall_threshold: Duration::from_secs(60),
            ..FAST_TIMINGS
        },
    );
    let (log, mut lines) = LogSink::channel();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let cancel_at = async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let at = Instant::now();
        trigger.cancel();
        at
    };

    let progress = ProgressSender::noop();
    let (result, cancel_at) = tokio::join!(
        ripper.rip("/dev/sr0", 1, &output, &progress, &log, &cancel),
        cancel_at,
    );
    let returned_at = Instant::now();

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
    assert!(
        returned_at - cancel_at <= dr_av::capture::POLL_INTERVAL,
        "took {:?} after cancel",
        returned_at - cancel_at
    );

    let pid = tools.pid(Tool::Mpv).expect("capture never started");
    assert!(!process_alive(pid), "capture process {pid} outlived cancellation");

    assert!(entries(&scratch).is_empty());
    assert_eq!(tools.calls(Tool::Mplayer), 0);
    assert!(!output.exists());

    let last = std::iter::from_fn(|| lines.try_recv().ok()).last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert_eq!(last.message, "Rip of title 1 cancelled");
}

#[tokio::test]
async fn stall_switches_to_secondary_once() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_HANGS)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, MKVMERGE_OK)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);

    ripper
        .rip("/dev/sr0", 4, &output, &ProgressSender::noop(), &LogSink::noop(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tools.calls(Tool::Mpv), 1);
    assert_eq!(tools.calls(Tool::Mplayer), 1);
    assert!(output.exists());
    assert!(entries(&scratch).is_empty());
}

#[tokio::test]
async fn new_rip_supersedes_running_one() {
    let tools = FakeTools::new()
        .with(Tool::Mpv, MPV_HANGS)
        .with(Tool::Mplayer, MPLAYER)
        .with(Tool::Mkvmerge, MKVMERGE_OK)
        .with(Tool::Ffmpeg, FFMPEG_OK);
    let root = tempfile::tempdir().unwrap();
    let scratch = root.path().join("scratch");
    let ripper = std::sync::Arc::new(
        discrip::Ripper::new(tools.registry(), scratch.clone()).with_capture_timings(
            dr_av::CaptureTimings {
                stall_threshold: Duration::from_secs(60),
                ..FAST_TIMINGS
            },
        ),
    );

    let first = {
        let ripper = ripper.clone();
        let output = root.path().join("first.mkv");
        tokio::spawn(async move {
            let (progress, log) = (ProgressSender::noop(), LogSink::noop());
            let result = ripper
                .rip("/dev/sr0", 1, &output, &progress, &log, &CancellationToken::new())
                .await;
            result
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    let first_pid = tools.pid(Tool::Mpv).expect("first capture never started");

    // The second job also hangs; cancel it from the caller side once the
    // first has been superseded.
    let cancel = CancellationToken::new();
    let second = {
        let ripper = ripper.clone();
        let output = root.path().join("second.mkv");
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let (progress, log) = (ProgressSender::noop(), LogSink::noop());
            let result = ripper
                .rip("/dev/sr0", 2, &output, &progress, &log, &cancel)
                .await;
            result
        })
    };

    let first = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .expect("first rip was not superseded")
        .unwrap();
    assert!(first.unwrap_err().is_cancelled());
    assert!(!process_alive(first_pid));

    let deadline = Instant::now() + Duration::from_secs(5);
    while tools.pid(Tool::Mpv) == Some(first_pid) {
        assert!(Instant::now() < deadline, "second capture never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    let second = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .unwrap()
        .unwrap();
    assert!(second.unwrap_err().is_cancelled());
    assert_eq!(tools.calls(Tool::Mpv), 2);
    assert!(!tools.overlapped(Tool::Mpv), "second capture started before the first was killed");
    assert!(entries(&scratch).is_empty());
}

#[tokio::test]
async fn invalid_title_is_rejected_before_capture() {
    let tools = FakeTools::new().with(Tool::Mpv, MPV_OK);
    let (_root, scratch, output) = rip_dirs();
    let ripper = tools.ripper(&scratch);

    let err = ripper
        .rip("/dev/sr0", 0, &output, &ProgressSender::noop(), &LogSink::noop(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(err, Error::Validation(_));
    assert_eq!(tools.calls(Tool::Mpv), 0);
}
