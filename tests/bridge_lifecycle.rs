//! Bridge start/stop against real child processes.
#![cfg(unix)]

use std::net::TcpListener;
use std::time::{Duration, Instant};

use aria_bridge::{Bridge, BridgeConfig, BridgeError, CameraChannel, StartOutcome};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(program: &str, args: &[&str]) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.producer.program = program.into();
    config.producer.args = args.iter().map(|s| s.to_string()).collect();
    config.producer.wrapper = None;
    config.transport.endpoint = format!("tcp://127.0.0.1:{}", free_port());
    config.transport.poll_timeout_ms = 20;
    config.observer.join_timeout_ms = 500;
    config.lifecycle.ready_poll_ms = 20;
    config.lifecycle.term_grace_ms = 300;
    config
}

#[test]
fn producer_exiting_early_fails_start() {
    let mut bridge = Bridge::new(config("sh", &["-c", "exit 3", "sh"])).unwrap();
    match bridge.start(Duration::from_secs(5)) {
        Err(BridgeError::ProducerExited(status)) => assert_eq!(status.code(), Some(3)),
        other => panic!("unexpected start result: {other:?}"),
    }
    assert!(!bridge.is_running());
    bridge.stop();
}

#[test]
fn silent_producer_is_unconfirmed_but_running() {
    let mut bridge = Bridge::new(config("sh", &["-c", "sleep 30", "sh"])).unwrap();
    let started = Instant::now();
    assert_eq!(bridge.start(Duration::from_millis(200)).unwrap(), StartOutcome::Unconfirmed);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(bridge.is_running());
    assert!(matches!(bridge.start(Duration::from_millis(10)), Err(BridgeError::AlreadyStarted)));

    let stats = bridge.get_stats().unwrap();
    assert_eq!(stats.store.total_frames(), 0);
    assert!(stats.producer_pid.is_some());

    bridge.stop();
    assert!(!bridge.is_running());
}

#[test]
fn stop_is_bounded_with_unresponsive_producer() {
    let mut bridge = Bridge::new(config(
        "sh",
        &["-c", "trap '' TERM; while :; do sleep 0.05; done", "sh"],
    ))
    .unwrap();
    assert_eq!(bridge.start(Duration::from_millis(100)).unwrap(), StartOutcome::Unconfirmed);

    let started = Instant::now();
    bridge.stop();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!bridge.is_running());
}

#[test]
fn mock_producer_round_trip() {
    let mut bridge = Bridge::new(config(
        env!("CARGO_BIN_EXE_mock-producer"),
        &["--width", "64", "--height", "48", "--fps", "60"],
    ))
    .unwrap();

    assert_eq!(bridge.start(Duration::from_secs(15)).unwrap(), StartOutcome::Ready);
    assert!(bridge.is_running());

    let frame = bridge.get_frame(CameraChannel::Rgb).unwrap();
    // Rotated a quarter turn into the downstream orientation.
    assert_eq!(frame.shape(), (64, 48, 3));
    assert!(bridge.get_frame(CameraChannel::Eye).is_none());

    let latest = bridge.get_latest(CameraChannel::Rgb).unwrap();
    assert!(latest.timestamp_ns > 0);

    let store = bridge.store().unwrap();
    let stats = bridge.get_stats().unwrap();
    assert_eq!(stats.store.source, "aria-bridge");
    assert!(stats.store.frames[&CameraChannel::Rgb] >= 1);
    assert_eq!(stats.profile, "profile12");

    bridge.stop();
    assert!(!bridge.is_running());
    // Last frames stay readable after stop.
    assert!(store.get_frame(CameraChannel::Rgb).is_some());
    bridge.stop();
}

#[test]
fn bridge_can_restart_after_stop() {
    let mut bridge = Bridge::new(config(
        env!("CARGO_BIN_EXE_mock-producer"),
        &["--width", "16", "--height", "16", "--fps", "60"],
    ))
    .unwrap();
    assert_eq!(bridge.start(Duration::from_secs(15)).unwrap(), StartOutcome::Ready);
    bridge.stop();
    assert_eq!(bridge.start(Duration::from_secs(15)).unwrap(), StartOutcome::Ready);
    assert!(bridge.is_running());
    drop(bridge);
}
