pub mod context;
pub mod orchestrator;
pub mod ping;
pub mod samples;
pub mod throughput;
pub mod transport;

use std::time::Duration;

pub use context::{RunContext, StreamCounter};
pub use orchestrator::{SpeedTest, TestSnapshot};
pub use ping::{PingProgress, PingResult, PingTest};
pub use samples::SampleBuffer;
pub use throughput::{Direction, ThroughputProgress, ThroughputResult, ThroughputTest};
pub use transport::{HttpTransport, Transport};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedTestResult {
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestStatus {
    #[default]
    Idle,
    Testing,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestPhase {
    #[default]
    Ping,
    Download,
    Upload,
    Done,
}

/// Megabits per second for `bytes` moved in `elapsed`. Zero when no time
/// has passed.
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 / secs) * 8.0 / 1_000_000.0
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
