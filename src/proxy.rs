//! Relays audio from the blob store to a listener, honoring HTTP ranges.
//!
//! A request goes through four steps: the track id is looked up in the
//! registry, its blob id is resolved to a fetch url, the listener's `Range`
//! is forwarded, and the upstream answer is relayed. An unknown track stops at
//! the first step without any upstream traffic. A failed resolve or fetch is
//! reported once and never retried here.

use std::{
    io::{BufReader, Read},
    sync::Arc,
};

use log::debug;
use thiserror::Error;

use crate::{
    domain::track::TrackId,
    remote::{RemoteBlobClient, RemoteError},
    storage::{self, SharedStorage, error::StorageError},
};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("track {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] RemoteError),

    #[error(transparent)]
    Storage(StorageError),
}

/// Upstream answer ready to be written to the listener.
///
/// The body is read lazily in chunks. Dropping it closes the upstream
/// connection.
pub struct ProxiedStream {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    pub body: BufReader<Box<dyn Read + Send>>,
}

pub struct StreamProxy {
    storage: SharedStorage,
    client: Arc<RemoteBlobClient>,
    chunk_size: usize,
}

impl StreamProxy {
    pub fn new(storage: SharedStorage, client: Arc<RemoteBlobClient>, chunk_size: usize) -> Self {
        Self {
            storage,
            client,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn handle(&self, track_id: &str, range: Option<&str>) -> Result<ProxiedStream, ProxyError> {
        let blob_id = self.blob_id(track_id)?;

        let url = self.client.resolve_fetch_url(&blob_id)?;

        let upstream = self.client.fetch_range(&url, range, None)?;

        debug!(
            "relaying track {track_id} (range {:?}) -> {}, length {:?}",
            range,
            upstream.status,
            upstream.content_length()
        );

        Ok(ProxiedStream {
            status: upstream.status,
            content_length: upstream.content_length(),
            headers: upstream.headers,
            body: BufReader::with_capacity(self.chunk_size, upstream.body),
        })
    }

    /// The registry lock is released before any network traffic starts
    fn blob_id(&self, track_id: &str) -> Result<String, ProxyError> {
        let not_found = || ProxyError::NotFound(track_id.to_string());

        let id: TrackId = track_id.parse().map_err(|_| not_found())?;
        let storage = storage::lock(&self.storage).map_err(ProxyError::Storage)?;

        match storage.get_blob_id(id) {
            Ok(blob_id) => Ok(blob_id),
            Err(StorageError::TrackNotFound(_)) => Err(not_found()),
            Err(e) => Err(ProxyError::Storage(e)),
        }
    }
}
