use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Byte counter owned by one stream. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct StreamCounter(Arc<AtomicU64>);

impl StreamCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-phase state shared by every concurrent stream of one measurement.
#[derive(Debug)]
pub struct RunContext {
    start: Instant,
    counters: Vec<StreamCounter>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(streams: usize, cancel: &CancellationToken) -> Self {
        Self {
            start: Instant::now(),
            counters: (0..streams).map(|_| StreamCounter::new()).collect(),
            cancel: cancel.child_token(),
        }
    }

    pub fn counter(&self, stream: usize) -> StreamCounter {
        self.counters[stream].clone()
    }

    pub fn streams(&self) -> usize {
        self.counters.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.counters.iter().map(StreamCounter::get).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
