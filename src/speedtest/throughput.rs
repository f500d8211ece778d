use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::{RngCore, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::RunContext;
use super::mbps;
use super::transport::Transport;
use crate::error::{Error, Result};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Drives concurrent transfers in one direction and estimates throughput
/// from the shared byte counters.
pub struct ThroughputTest {
    direction: Direction,
    endpoints: Vec<String>,
    streams: usize,
    payload_bytes: usize,
    sample_interval: Duration,
    min_sample_elapsed: Duration,
    transfer_timeout: Duration,
    speed_samples: Vec<f64>,
}

impl ThroughputTest {
    pub fn new(direction: Direction, endpoints: Vec<String>, settings: &Settings) -> Self {
        let streams = match direction {
            Direction::Download => endpoints.len(),
            Direction::Upload => settings.upload_streams,
        };
        Self {
            direction,
            endpoints,
            streams,
            payload_bytes: settings.upload_payload_bytes,
            sample_interval: settings.sample_interval(),
            min_sample_elapsed: settings.min_sample_elapsed(),
            transfer_timeout: settings.transfer_timeout(),
            speed_samples: Vec::new(),
        }
    }

    /// One stream per configured download endpoint.
    pub fn download(settings: &Settings) -> Self {
        Self::new(Direction::Download, settings.download_endpoints.clone(), settings)
    }

    /// `upload_streams` streams spread round-robin over the upload endpoints.
    pub fn upload(settings: &Settings) -> Self {
        Self::new(Direction::Upload, settings.upload_endpoints.clone(), settings)
    }

    pub fn with_payload_bytes(mut self, payload_bytes: usize) -> Self {
        self.payload_bytes = payload_bytes;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn streams(&self) -> usize {
        if self.endpoints.is_empty() {
            0
        } else {
            self.streams
        }
    }

    /// Per-tick speed samples of the last run.
    pub fn speed_samples(&self) -> &[f64] {
        &self.speed_samples
    }

    /// Run every stream to completion. Failed, timed out and unreachable
    /// streams contribute zero bytes; only cancellation fails the phase.
    pub async fn run(
        &mut self,
        transport: &dyn Transport,
        cancel: &CancellationToken,
        progress_tx: mpsc::Sender<ThroughputProgress>,
    ) -> Result<ThroughputResult> {
        self.speed_samples.clear();

        let payload = match self.direction {
            Direction::Upload => random_payload(self.payload_bytes),
            Direction::Download => Bytes::new(),
        };
        let expected_bytes = match self.direction {
            Direction::Upload => Some(self.payload_bytes as u64 * self.streams() as u64),
            Direction::Download => None,
        };

        let ctx = RunContext::new(self.streams(), cancel);
        let mut pending: FuturesUnordered<_> = (0..ctx.streams())
            .map(|stream| {
                let url = &self.endpoints[stream % self.endpoints.len()];
                let counter = ctx.counter(stream);
                let transfer = match self.direction {
                    Direction::Download => transport.download(url, counter),
                    Direction::Upload => transport.upload(url, payload.clone(), counter),
                };
                settle(
                    stream,
                    url.clone(),
                    transfer,
                    self.transfer_timeout,
                    ctx.cancel_token().clone(),
                )
            })
            .collect();
        debug!("{:?}: dispatched {} streams", self.direction, ctx.streams());

        let mut ticker = tokio::time::interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut settled = 0;
        let mut total_bytes: u64 = 0;

        while !pending.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                Some(bytes) = pending.next() => {
                    settled += 1;
                    total_bytes += bytes;
                    let _ = progress_tx
                        .send(ThroughputProgress {
                            direction: self.direction,
                            mbps: None,
                            bytes: ctx.total_bytes(),
                            expected_bytes,
                            settled,
                            streams: ctx.streams(),
                        })
                        .await;
                }
                _ = ticker.tick() => {
                    if let Some(speed) = self.sample(&ctx) {
                        let _ = progress_tx
                            .send(ThroughputProgress {
                                direction: self.direction,
                                mbps: Some(speed),
                                bytes: ctx.total_bytes(),
                                expected_bytes,
                                settled,
                                streams: ctx.streams(),
                            })
                            .await;
                    }
                }
            }
        }

        let result = summarize(total_bytes, ctx.elapsed(), &self.speed_samples);
        info!(
            "{:?}: {:.2} Mbps ({} bytes in {:.2}s, final {:.2}, sample mean {:.2})",
            self.direction,
            result.speed_mbps,
            result.bytes,
            result.elapsed.as_secs_f64(),
            result.final_mbps,
            result.mean_sample_mbps
        );
        Ok(result)
    }

    fn sample(&mut self, ctx: &RunContext) -> Option<f64> {
        let elapsed = ctx.elapsed();
        if elapsed < self.min_sample_elapsed {
            return None;
        }
        let speed = mbps(ctx.total_bytes(), elapsed);
        self.speed_samples.push(speed);
        Some(speed)
    }
}

async fn settle(
    stream: usize,
    url: String,
    transfer: BoxFuture<'static, Result<u64>>,
    limit: Duration,
    cancel: CancellationToken,
) -> u64 {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = tokio::time::timeout(limit, transfer) => {
            result.unwrap_or(Err(Error::Timeout(limit.as_millis() as u64)))
        }
    };

    match outcome {
        Ok(bytes) => {
            debug!("Stream {stream} ({url}) finished with {bytes} bytes");
            bytes
        }
        Err(Error::Cancelled) => 0,
        Err(e) => {
            warn!("Stream {stream} ({url}) failed: {e}");
            0
        }
    }
}

/// Reported speed is the higher of the whole-phase rate and the mean of the
/// tick samples. Without samples the whole-phase rate stands alone.
pub fn summarize(bytes: u64, elapsed: Duration, samples: &[f64]) -> ThroughputResult {
    let final_mbps = mbps(bytes, elapsed);
    let mean_sample_mbps = if samples.is_empty() {
        final_mbps
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    };

    ThroughputResult {
        speed_mbps: final_mbps.max(mean_sample_mbps),
        final_mbps,
        mean_sample_mbps,
        bytes,
        elapsed,
    }
}

/// Incompressible filler for upload bodies.
pub fn random_payload(size: usize) -> Bytes {
    let mut rng = rand::rngs::StdRng::from_entropy();
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    Bytes::from(data)
}

#[derive(Debug, Clone)]
pub struct ThroughputProgress {
    pub direction: Direction,
    /// Present on sampling ticks, absent when a stream settles.
    pub mbps: Option<f64>,
    pub bytes: u64,
    pub expected_bytes: Option<u64>,
    pub settled: usize,
    pub streams: usize,
}

impl ThroughputProgress {
    /// Phase completion in percent. Uses bytes when the total is known,
    /// settled streams otherwise.
    pub fn percent(&self) -> f64 {
        let ratio = match self.expected_bytes {
            Some(expected) if expected > 0 => self.bytes as f64 / expected as f64,
            _ if self.streams > 0 => self.settled as f64 / self.streams as f64,
            _ => 0.0,
        };
        (ratio * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputResult {
    pub speed_mbps: f64,
    pub final_mbps: f64,
    pub mean_sample_mbps: f64,
    pub bytes: u64,
    pub elapsed: Duration,
}
