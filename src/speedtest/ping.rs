use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::transport::Transport;
use crate::settings::Settings;

/// Recorded for a probe that errored, timed out or was aborted. Always above
/// the validity ceiling, so it is visible in the raw samples but never
/// aggregated.
pub const FAILED_PROBE_MS: f64 = 999.0;

pub struct PingTest {
    samples: Vec<f64>,
    url: String,
    ping_count: usize,
    interval: Duration,
    timeout: Duration,
    ceiling_ms: f64,
}

impl PingTest {
    pub fn new(settings: &Settings) -> Self {
        Self {
            samples: Vec::new(),
            url: settings.ping_endpoint.clone(),
            ping_count: settings.ping_probe_count,
            interval: settings.ping_interval(),
            timeout: settings.probe_timeout(),
            ceiling_ms: settings.ping_ceiling_ms,
        }
    }

    /// Issue the probes sequentially. Failed probes never fail the
    /// measurement; cancellation stops probing and aggregates what was
    /// collected.
    pub async fn run(
        &mut self,
        transport: &dyn Transport,
        cancel: &CancellationToken,
        progress_tx: mpsc::Sender<PingProgress>,
    ) -> PingResult {
        self.samples.clear();

        for i in 0..self.ping_count {
            if cancel.is_cancelled() {
                break;
            }

            let start = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(self.timeout, transport.probe(&self.url)) => Some(result),
            };

            let rtt = match outcome {
                Some(Ok(Ok(()))) => start.elapsed().as_secs_f64() * 1000.0,
                Some(Ok(Err(e))) => {
                    debug!("Probe {} failed: {e}", i + 1);
                    FAILED_PROBE_MS
                }
                Some(Err(_)) => {
                    debug!("Probe {} timed out", i + 1);
                    FAILED_PROBE_MS
                }
                None => {
                    self.samples.push(FAILED_PROBE_MS);
                    break;
                }
            };
            debug!("Probe {}/{}: {rtt:.1} ms", i + 1, self.ping_count);
            self.samples.push(rtt);

            let _ = progress_tx
                .send(PingProgress {
                    completed: i + 1,
                    total: self.ping_count,
                    latest_ms: (rtt < self.ceiling_ms).then_some(rtt),
                })
                .await;

            if i + 1 < self.ping_count {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        calculate_result(&self.samples, self.ceiling_ms)
    }

    /// Raw round trips of the last run, failures included.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Mean round trip and mean absolute consecutive difference over the
/// samples below `ceiling_ms`.
pub fn calculate_result(samples: &[f64], ceiling_ms: f64) -> PingResult {
    let valid: Vec<f64> = samples.iter().copied().filter(|&t| t < ceiling_ms).collect();
    if valid.is_empty() {
        return PingResult { avg_ms: 0.0, jitter_ms: 0.0 };
    }

    let avg = valid.iter().sum::<f64>() / valid.len() as f64;
    let jitter = if valid.len() > 1 {
        let diffs: f64 = valid.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        diffs / (valid.len() - 1) as f64
    } else {
        0.0
    };

    PingResult { avg_ms: avg, jitter_ms: jitter }
}

#[derive(Debug, Clone)]
pub struct PingProgress {
    pub completed: usize,
    pub total: usize,
    pub latest_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingResult {
    pub avg_ms: f64,
    pub jitter_ms: f64,
}
