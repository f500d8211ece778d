use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::ping::{PingProgress, PingTest};
use super::samples::SampleBuffer;
use super::throughput::{ThroughputProgress, ThroughputResult, ThroughputTest};
use super::transport::{HttpTransport, Transport};
use super::{round_to, SpeedTestResult, TestPhase, TestStatus};
use crate::error::{Error, Result};
use crate::settings::Settings;

/// Handle to the measurement engine. Clones share the same run state.
#[derive(Clone)]
pub struct SpeedTest {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Settings,
    transport: Arc<dyn Transport>,
    state: RwLock<TestState>,
}

struct TestState {
    generation: u64,
    status: TestStatus,
    phase: TestPhase,
    progress: f64,
    current_speed: f64,
    result: SpeedTestResult,
    samples: SampleBuffer,
    cancel: Option<CancellationToken>,
}

impl TestState {
    fn new(generation: u64, capacity: usize) -> Self {
        Self {
            generation,
            status: TestStatus::Idle,
            phase: TestPhase::Ping,
            progress: 0.0,
            current_speed: 0.0,
            result: SpeedTestResult::default(),
            samples: SampleBuffer::new(capacity),
            cancel: None,
        }
    }
}

/// Point-in-time copy of everything a front end displays.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSnapshot {
    pub status: TestStatus,
    pub phase: TestPhase,
    /// Completion of the current phase, 0 to 100.
    pub progress: f64,
    pub current_speed: f64,
    pub results: SpeedTestResult,
    pub sample_history: Vec<f64>,
}

impl TestSnapshot {
    /// Results are only final once the run has completed.
    pub fn final_results(&self) -> Option<SpeedTestResult> {
        (self.status == TestStatus::Completed).then_some(self.results)
    }
}

impl SpeedTest {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let transport = HttpTransport::new()?;
        Self::with_transport(settings, Arc::new(transport))
    }

    pub fn with_transport(settings: Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        settings.validate()?;
        let state = TestState::new(0, settings.sample_buffer_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                transport,
                state: RwLock::new(state),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn status(&self) -> TestStatus {
        self.inner.state.read().status
    }

    pub fn snapshot(&self) -> TestSnapshot {
        let state = self.inner.state.read();
        TestSnapshot {
            status: state.status,
            phase: state.phase,
            progress: state.progress,
            current_speed: state.current_speed,
            results: state.result,
            sample_history: state.samples.to_vec(),
        }
    }

    /// Begin a run in the background. Returns `None` without touching any
    /// state when a run is already in progress.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let (generation, cancel) = {
            let mut state = self.inner.state.write();
            if state.status == TestStatus::Testing {
                debug!("Run {} already in progress, ignoring start", state.generation);
                return None;
            }

            let cancel = CancellationToken::new();
            state.generation += 1;
            state.status = TestStatus::Testing;
            state.phase = TestPhase::Ping;
            state.progress = 0.0;
            state.current_speed = 0.0;
            state.result = SpeedTestResult::default();
            state.samples.clear();
            state.cancel = Some(cancel.clone());
            (state.generation, cancel)
        };

        info!("Starting run {generation}");
        let this = self.clone();
        Some(tokio::spawn(async move {
            this.execute(generation, cancel).await;
        }))
    }

    /// Return to idle from any state, cancelling a run in progress. Anything
    /// the cancelled run reports afterwards is discarded.
    pub fn reset(&self) {
        let mut state = self.inner.state.write();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        let generation = state.generation + 1;
        *state = TestState::new(generation, self.inner.settings.sample_buffer_capacity);
        debug!("Reset to idle");
    }

    /// Start a run and wait for it, returning the frozen results.
    pub async fn run(&self) -> Result<SpeedTestResult> {
        let handle = self.start().ok_or(Error::Incomplete)?;
        handle.await?;
        self.snapshot().final_results().ok_or(Error::Incomplete)
    }

    async fn execute(&self, generation: u64, cancel: CancellationToken) {
        match self.run_phases(generation, &cancel).await {
            Ok(result) => info!(
                "Run {generation} complete: ping {} ms, jitter {} ms, down {} Mbps, up {} Mbps",
                result.ping_ms, result.jitter_ms, result.download_mbps, result.upload_mbps
            ),
            Err(e) if e.is_cancelled() => debug!("Run {generation} cancelled"),
            Err(e) => {
                error!("Speed test error: {e}");
                let capacity = self.inner.settings.sample_buffer_capacity;
                self.apply(generation, &cancel, |state| {
                    *state = TestState::new(generation, capacity);
                });
            }
        }
    }

    async fn run_phases(&self, generation: u64, cancel: &CancellationToken) -> Result<SpeedTestResult> {
        let ping = {
            let (tx, mut rx) = mpsc::channel::<PingProgress>(32);
            let transport = self.inner.transport.clone();
            let phase_cancel = cancel.clone();
            let mut test = PingTest::new(&self.inner.settings);
            let handle =
                tokio::spawn(async move { test.run(transport.as_ref(), &phase_cancel, tx).await });

            while let Some(progress) = rx.recv().await {
                self.apply(generation, cancel, |state| {
                    state.progress = progress.completed as f64 / progress.total as f64 * 100.0;
                });
            }
            handle.await?
        };
        info!("Ping {:.1} ms, jitter {:.2} ms", ping.avg_ms, ping.jitter_ms);
        self.advance(generation, cancel, |state| {
            state.result.ping_ms = round_to(ping.avg_ms, 0);
            state.result.jitter_ms = round_to(ping.jitter_ms, 2);
            state.phase = TestPhase::Download;
            state.progress = 0.0;
        })?;

        let download = self
            .measure(generation, cancel, ThroughputTest::download(&self.inner.settings))
            .await?;
        self.advance(generation, cancel, |state| {
            state.result.download_mbps = round_to(download.speed_mbps, 0);
            state.current_speed = download.speed_mbps;
            state.samples.push(download.speed_mbps);
            state.phase = TestPhase::Upload;
            state.progress = 0.0;
        })?;

        let upload = self
            .measure(generation, cancel, ThroughputTest::upload(&self.inner.settings))
            .await?;
        let mut result = SpeedTestResult::default();
        self.advance(generation, cancel, |state| {
            state.result.upload_mbps = round_to(upload.speed_mbps, 0);
            state.current_speed = upload.speed_mbps;
            state.samples.push(upload.speed_mbps);
            state.phase = TestPhase::Done;
            state.status = TestStatus::Completed;
            state.progress = 100.0;
            state.cancel = None;
            result = state.result;
        })?;

        Ok(result)
    }

    async fn measure(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        mut test: ThroughputTest,
    ) -> Result<ThroughputResult> {
        let (tx, mut rx) = mpsc::channel::<ThroughputProgress>(64);
        let transport = self.inner.transport.clone();
        let phase_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { test.run(transport.as_ref(), &phase_cancel, tx).await });

        while let Some(progress) = rx.recv().await {
            self.apply(generation, cancel, |state| {
                state.progress = progress.percent();
                if let Some(speed) = progress.mbps {
                    state.current_speed = speed;
                    state.samples.push(speed);
                }
            });
        }

        handle.await?
    }

    /// Apply `update` only if the run is still the current one.
    fn apply(&self, generation: u64, cancel: &CancellationToken, update: impl FnOnce(&mut TestState)) -> bool {
        let mut state = self.inner.state.write();
        if state.generation != generation || cancel.is_cancelled() {
            return false;
        }
        update(&mut state);
        true
    }

    fn advance(&self, generation: u64, cancel: &CancellationToken, update: impl FnOnce(&mut TestState)) -> Result<()> {
        if self.apply(generation, cancel, update) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }
}
