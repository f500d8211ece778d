//! Network performance estimation: latency and jitter from timed round
//! trips, download and upload throughput from concurrent HTTP transfers,
//! with a live sample stream for display.

pub mod error;
pub mod settings;
pub mod speedtest;

pub use error::{Error, Result};
pub use settings::Settings;
pub use speedtest::{SpeedTest, SpeedTestResult, TestPhase, TestSnapshot, TestStatus};
