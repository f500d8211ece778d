mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_settings, FakeTransport};
use speedprobe::error::Error;
use speedprobe::speedtest::{SpeedTest, SpeedTestResult, TestPhase, TestStatus};

fn engine(transport: FakeTransport) -> SpeedTest {
    SpeedTest::with_transport(fast_settings(), Arc::new(transport)).unwrap()
}

#[tokio::test]
async fn full_run_completes_with_rounded_results() {
    let engine = engine(FakeTransport::default());

    let result = engine.run().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, TestStatus::Completed);
    assert_eq!(snapshot.phase, TestPhase::Done);
    assert_eq!(snapshot.progress, 100.0);
    assert_eq!(snapshot.final_results(), Some(result));

    assert!(result.ping_ms >= 0.0 && result.ping_ms < 500.0);
    assert_eq!(result.ping_ms.fract(), 0.0);
    assert_eq!(result.download_mbps.fract(), 0.0);
    assert_eq!(result.upload_mbps.fract(), 0.0);
    assert!(result.download_mbps > 0.0);
    assert!(result.upload_mbps > 0.0);

    assert!(!snapshot.sample_history.is_empty());
    assert!(snapshot.sample_history.len() <= 30);
    assert_eq!(snapshot.sample_history.last().copied(), Some(snapshot.current_speed));
}

#[tokio::test]
async fn failed_downloads_degrade_to_zero_and_run_continues() {
    let transport = FakeTransport {
        fail_downloads: true,
        ..FakeTransport::default()
    };
    let downloads = transport.downloads.clone();
    let uploads = transport.uploads.clone();
    let engine = engine(transport);

    let result = engine.run().await.unwrap();

    assert_eq!(downloads.load(Ordering::SeqCst), 4);
    assert_eq!(uploads.load(Ordering::SeqCst), 2);
    assert_eq!(result.download_mbps, 0.0);
    assert!(result.upload_mbps > 0.0);
    assert_eq!(engine.status(), TestStatus::Completed);
}

#[tokio::test]
async fn start_while_testing_is_ignored() {
    let transport = FakeTransport::default();
    let probes = transport.probes.clone();
    let engine = engine(transport);

    let handle = engine.start().expect("first start runs");
    assert_eq!(engine.status(), TestStatus::Testing);
    assert!(engine.start().is_none());
    assert!(matches!(engine.run().await, Err(Error::Incomplete)));

    handle.await.unwrap();
    assert_eq!(engine.status(), TestStatus::Completed);
    assert_eq!(probes.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn reset_mid_run_discards_late_results() {
    let transport = FakeTransport {
        download_time: Duration::from_millis(300),
        ..FakeTransport::default()
    };
    let uploads = transport.uploads.clone();
    let engine = engine(transport);

    let handle = engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(engine.snapshot().phase, TestPhase::Download);

    engine.reset();
    handle.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, TestStatus::Idle);
    assert_eq!(snapshot.phase, TestPhase::Ping);
    assert_eq!(snapshot.results, SpeedTestResult::default());
    assert!(snapshot.sample_history.is_empty());
    assert_eq!(snapshot.current_speed, 0.0);
    assert_eq!(uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reset_after_completion_returns_to_idle() {
    let engine = engine(FakeTransport::default());
    engine.run().await.unwrap();

    engine.reset();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, TestStatus::Idle);
    assert_eq!(snapshot.phase, TestPhase::Ping);
    assert_eq!(snapshot.results, SpeedTestResult::default());
    assert!(snapshot.sample_history.is_empty());
    assert_eq!(snapshot.final_results(), None);
}

#[tokio::test]
async fn engine_can_run_again_after_completion() {
    let transport = FakeTransport::default();
    let probes = transport.probes.clone();
    let engine = engine(transport);

    engine.run().await.unwrap();
    engine.run().await.unwrap();

    assert_eq!(probes.load(Ordering::SeqCst), 10);
    assert_eq!(engine.status(), TestStatus::Completed);
}

#[tokio::test]
async fn unexpected_failure_aborts_to_idle() {
    let transport = FakeTransport {
        panic_on_upload: true,
        ..FakeTransport::default()
    };
    let engine = engine(transport);

    assert!(matches!(engine.run().await, Err(Error::Incomplete)));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, TestStatus::Idle);
    assert_eq!(snapshot.phase, TestPhase::Ping);
    assert_eq!(snapshot.results, SpeedTestResult::default());
    assert_eq!(snapshot.current_speed, 0.0);
    assert!(snapshot.sample_history.is_empty());
    assert_eq!(snapshot.final_results(), None);
    assert!(engine.start().is_some());
}

#[tokio::test]
async fn sample_history_respects_capacity_while_running() {
    let transport = FakeTransport {
        download_time: Duration::from_millis(400),
        ..FakeTransport::default()
    };
    let settings = speedprobe::settings::Settings {
        sample_buffer_capacity: 3,
        ..fast_settings()
    };
    let engine = SpeedTest::with_transport(settings, Arc::new(transport)).unwrap();

    let handle = engine.start().unwrap();
    let mut max_seen = 0;
    while !handle.is_finished() {
        max_seen = max_seen.max(engine.snapshot().sample_history.len());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(max_seen, 3);
    assert_eq!(engine.snapshot().sample_history.len(), 3);
}

#[test]
fn invalid_settings_are_rejected_with_custom_transport() {
    let settings = speedprobe::settings::Settings {
        sample_interval_ms: 0,
        ..fast_settings()
    };
    let result = SpeedTest::with_transport(settings, Arc::new(FakeTransport::default()));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn reset_during_ping_discards_latency_and_skips_download() {
    let transport = FakeTransport {
        probe_delay: Duration::from_millis(40),
        ..FakeTransport::default()
    };
    let probes = transport.probes.clone();
    let downloads = transport.downloads.clone();
    let engine = engine(transport);

    let handle = engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(engine.snapshot().phase, TestPhase::Ping);

    engine.reset();
    handle.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, TestStatus::Idle);
    assert_eq!(snapshot.phase, TestPhase::Ping);
    assert_eq!(snapshot.results, SpeedTestResult::default());
    assert_eq!(snapshot.progress, 0.0);
    assert!(probes.load(Ordering::SeqCst) < 5);
    assert_eq!(downloads.load(Ordering::SeqCst), 0);
}
