//! Pulls the leading bytes of a remote track for tag extraction.

use futures::future::{BoxFuture, FutureExt};
use reqwest::header::RANGE;
use reqwest::{Client, Response};
use tracing::debug;

use crate::error::FetchError;

/// 256 KiB is enough to hold an ID3v2 header with a modest cover image.
pub const DEFAULT_PREFIX_BYTES: usize = 256 * 1024;

/// Source of a track's leading bytes.
pub trait ByteSource: Send + Sync {
    fn fetch_prefix<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;
}

/// Asks a byte-range proxy (`GET <endpoint>?url=<track>`) for the prefix.
pub struct ProxyFetcher {
    client: Client,
    endpoint: String,
    limit: usize,
}

impl ProxyFetcher {
    pub fn new(client: Client, endpoint: impl Into<String>, limit: usize) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            limit,
        }
    }
}

impl ByteSource for ProxyFetcher {
    fn fetch_prefix<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            debug!(track = url, proxy = %self.endpoint, "fetching track prefix via proxy");
            let resp = self
                .client
                .get(&self.endpoint)
                .query(&[("url", url)])
                .send()
                .await?;
            read_prefix(resp, self.limit).await
        }
        .boxed()
    }
}

/// Requests the prefix straight from the track's host with a `Range` header.
pub struct RangeFetcher {
    client: Client,
    limit: usize,
}

impl RangeFetcher {
    pub fn new(client: Client, limit: usize) -> Self {
        Self { client, limit }
    }
}

impl ByteSource for RangeFetcher {
    fn fetch_prefix<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            debug!(track = url, bytes = self.limit, "fetching track prefix");
            let resp = self
                .client
                .get(url)
                .header(RANGE, range_header(self.limit))
                .send()
                .await?;
            read_prefix(resp, self.limit).await
        }
        .boxed()
    }
}

fn range_header(limit: usize) -> String {
    format!("bytes=0-{}", limit.saturating_sub(1))
}

/// Reads at most `limit` bytes of the body. Servers that ignore `Range` and
/// send the whole file are cut off once the limit is reached.
async fn read_prefix(mut resp: Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let mut bytes = Vec::with_capacity(limit.min(64 * 1024));
    while let Some(chunk) = resp.chunk().await? {
        let room = limit - bytes.len();
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if bytes.len() >= limit {
            break;
        }
    }

    if bytes.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(bytes)
}
