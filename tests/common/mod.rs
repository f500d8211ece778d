//! Shared fake transport for engine tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

use speedprobe::error::{Error, Result};
use speedprobe::settings::Settings;
use speedprobe::speedtest::{StreamCounter, Transport};

pub struct FakeTransport {
    pub probe_delay: Duration,
    pub download_bytes: u64,
    pub download_time: Duration,
    pub fail_downloads: bool,
    pub upload_time: Duration,
    pub panic_on_upload: bool,
    pub probes: Arc<AtomicUsize>,
    pub downloads: Arc<AtomicUsize>,
    pub uploads: Arc<AtomicUsize>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(2),
            download_bytes: 1_000_000,
            download_time: Duration::from_millis(50),
            fail_downloads: false,
            upload_time: Duration::from_millis(50),
            panic_on_upload: false,
            probes: Arc::new(AtomicUsize::new(0)),
            downloads: Arc::new(AtomicUsize::new(0)),
            uploads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

const STEPS: u64 = 10;

impl Transport for FakeTransport {
    fn probe(&self, _url: &str) -> BoxFuture<'static, Result<()>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = self.probe_delay;
        async move {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        .boxed()
    }

    fn download(&self, url: &str, counter: StreamCounter) -> BoxFuture<'static, Result<u64>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_downloads;
        let bytes = self.download_bytes;
        let step = self.download_time / STEPS as u32;
        let url = url.to_string();
        async move {
            if fail {
                tokio::time::sleep(step).await;
                return Err(Error::Transfer(format!("{url}: connection reset")));
            }
            for _ in 0..STEPS {
                tokio::time::sleep(step).await;
                counter.add(bytes / STEPS);
            }
            Ok(bytes / STEPS * STEPS)
        }
        .boxed()
    }

    fn upload(&self, _url: &str, payload: Bytes, counter: StreamCounter) -> BoxFuture<'static, Result<u64>> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let panic_on_upload = self.panic_on_upload;
        let step = self.upload_time / STEPS as u32;
        async move {
            if panic_on_upload {
                panic!("upload transport exploded");
            }
            let chunk = payload.len() as u64 / STEPS;
            for _ in 0..STEPS {
                tokio::time::sleep(step).await;
                counter.add(chunk);
            }
            Ok(payload.len() as u64)
        }
        .boxed()
    }
}

pub fn fast_settings() -> Settings {
    Settings {
        ping_probe_count: 5,
        ping_interval_ms: 1,
        download_endpoints: vec![
            "http://fake/a".into(),
            "http://fake/b".into(),
            "http://fake/c".into(),
            "http://fake/d".into(),
        ],
        upload_endpoints: vec!["http://fake/up".into()],
        upload_payload_bytes: 256 * 1024,
        upload_streams: 2,
        sample_buffer_capacity: 30,
        sample_interval_ms: 10,
        min_sample_elapsed_ms: 10,
        transfer_timeout_ms: 5_000,
        ..Settings::default()
    }
}
