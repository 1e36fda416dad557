use std::{
    fmt,
    io::{self, Read},
    time::Duration,
};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, RANGE},
};
use serde::Deserialize;

use crate::{config::UpstreamConfig, remote::error::RemoteError};

/// Headers mirrored from upstream to our own clients, when upstream sent them.
pub const RELAYED_HEADERS: [&str; 4] = [
    "Content-Type",
    "Content-Length",
    "Content-Range",
    "Accept-Ranges",
];

/// Time-bounded direct download url of a blob.
///
/// It embeds the store credential, so it must never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchUrl(String);

impl FetchUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FetchUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchUrl(<redacted>)")
    }
}

/// Status, relayable headers and the not yet consumed body of an upstream answer.
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
}

impl UpstreamResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// `Range` header value asking for the first `cap` bytes of a resource
pub fn prefix_range(cap: u64) -> String {
    format!("bytes=0-{}", cap.saturating_sub(1))
}

/// Client of the remote blob store.
///
/// Built once at startup and shared between request handlers.
pub struct RemoteBlobClient {
    http: Client,
    api_base: String,
    token: String,
    request_timeout: Duration,
}

impl RemoteBlobClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, RemoteError> {
        // no overall timeout on the client: relayed streams may run for as long as the listener wants
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(None::<Duration>)
            .build()
            .map_err(RemoteError::Client)?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Exchanges an opaque blob identifier for a direct fetch url.
    pub fn resolve_fetch_url(&self, blob_id: &str) -> Result<FetchUrl, RemoteError> {
        let resolution = |reason: String| RemoteError::Resolution {
            blob_id: blob_id.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(format!("{}/bot{}/getFile", self.api_base, self.token))
            .query(&[("file_id", blob_id)])
            .timeout(self.request_timeout)
            .send()
            .map_err(|e| resolution(e.without_url().to_string()))?;

        let status = resp.status();
        let envelope: ApiEnvelope<FileInfo> = resp.json().map_err(|e| {
            resolution(format!(
                "unreadable answer (status {status}): {}",
                e.without_url()
            ))
        })?;

        if !status.is_success() || !envelope.ok {
            return Err(resolution(
                envelope
                    .description
                    .unwrap_or_else(|| format!("store answered {status}")),
            ));
        }

        let file_path = envelope
            .result
            .and_then(|info| info.file_path)
            .ok_or_else(|| resolution("store returned no file path".to_string()))?;

        log::debug!("resolved blob {blob_id}");
        Ok(FetchUrl(format!(
            "{}/file/bot{}/{}",
            self.api_base, self.token, file_path
        )))
    }

    /// Issues a GET, forwarding `range` verbatim as the `Range` header.
    ///
    /// Any 2xx answer (normally 200 or 206) is returned with its body unread.
    /// `timeout` bounds the whole exchange including the body, so leave it
    /// `None` for relayed streams.
    pub fn fetch_range(
        &self,
        url: &FetchUrl,
        range: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<UpstreamResponse, RemoteError> {
        let mut req = self.http.get(url.as_str());
        if let Some(range) = range {
            req = req.header(RANGE, range);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().map_err(|e| RemoteError::Fetch {
            reason: e.without_url().to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Fetch {
                reason: format!("store answered {status}"),
            });
        }

        Ok(UpstreamResponse {
            status: status.as_u16(),
            headers: relay_headers(resp.headers()),
            body: Box::new(resp),
        })
    }

    /// Fetches at most `limit` bytes, bounded by the request timeout.
    ///
    /// Reading stops at `limit` even if upstream ignores `range` and sends
    /// the whole resource.
    pub fn fetch_bytes(
        &self,
        url: &FetchUrl,
        range: Option<&str>,
        limit: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        let resp = self.fetch_range(url, range, Some(self.request_timeout))?;

        let mut buf = Vec::new();
        resp.body
            .take(limit)
            .read_to_end(&mut buf)
            .map_err(|e: io::Error| RemoteError::Fetch {
                reason: format!("body read failed: {}", e.kind()),
            })?;
        Ok(buf)
    }
}

fn relay_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    RELAYED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
