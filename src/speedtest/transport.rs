use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use super::context::StreamCounter;
use crate::error::{Error, Result};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// The HTTP operations the measurers need. Futures are `'static` so the
/// engine can run them concurrently and drop them on cancellation.
pub trait Transport: Send + Sync + 'static {
    /// One round trip with a near-empty response.
    fn probe(&self, url: &str) -> BoxFuture<'static, Result<()>>;

    /// Fetch `url`, adding each received chunk to `counter`. Resolves to the
    /// total bytes received.
    fn download(&self, url: &str, counter: StreamCounter) -> BoxFuture<'static, Result<u64>>;

    /// POST `payload` to `url`, adding each chunk handed to the connection to
    /// `counter`. Resolves to the payload length.
    fn upload(&self, url: &str, payload: Bytes, counter: StreamCounter)
        -> BoxFuture<'static, Result<u64>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("speedprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn probe(&self, url: &str) -> BoxFuture<'static, Result<()>> {
        let request = self.client.head(url).header(CACHE_CONTROL, "no-store");
        async move {
            request.send().await?;
            Ok(())
        }
        .boxed()
    }

    fn download(&self, url: &str, counter: StreamCounter) -> BoxFuture<'static, Result<u64>> {
        let request = self.client.get(url).header(CACHE_CONTROL, "no-store");
        let url = url.to_string();
        async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Error::Status {
                    url,
                    status: response.status().as_u16(),
                });
            }

            let mut stream = response.bytes_stream();
            let mut received: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                received += chunk.len() as u64;
                counter.add(chunk.len() as u64);
            }
            Ok(received)
        }
        .boxed()
    }

    fn upload(
        &self,
        url: &str,
        payload: Bytes,
        counter: StreamCounter,
    ) -> BoxFuture<'static, Result<u64>> {
        let total = payload.len() as u64;
        let chunks: Vec<Bytes> = (0..payload.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|offset| payload.slice(offset..(offset + UPLOAD_CHUNK_SIZE).min(payload.len())))
            .collect();
        let body = futures::stream::iter(chunks).map(move |chunk| {
            counter.add(chunk.len() as u64);
            Ok::<_, std::io::Error>(chunk)
        });

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body));
        let url = url.to_string();
        async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Error::Status {
                    url,
                    status: response.status().as_u16(),
                });
            }
            Ok(total)
        }
        .boxed()
    }
}
