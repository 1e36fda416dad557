//! Cover art cache, filled from the audio itself or from the upload thumbnail.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    config::CoversConfig,
    domain::{content_id::ContentId, track::AudioBlob},
    remote::{RemoteBlobClient, RemoteError, prefix_range},
    tags::{EmbeddedImage, extract_embedded_image},
};

#[derive(Debug, Error)]
enum CoverError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("cache write failed: {0}")]
    Fs(#[from] io::Error),

    #[error("thumbnail is empty")]
    EmptyThumbnail,

    #[error("thumbnail exceeds {0} bytes")]
    ThumbnailTooLarge(u64),
}

pub struct CoverExtractor {
    client: Arc<RemoteBlobClient>,
    dir: PathBuf,
    prefix_cap: u64,
    max_thumbnail_bytes: u64,
}

impl CoverExtractor {
    /// Creates the cache directory if needed
    pub fn new(client: Arc<RemoteBlobClient>, config: &CoversConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        Ok(Self {
            client,
            dir: config.dir.clone(),
            prefix_cap: config.prefix_cap_bytes,
            max_thumbnail_bytes: config.max_thumbnail_bytes,
        })
    }

    /// Where the cover of `content_id` lives once extracted
    pub fn cover_path(&self, content_id: &ContentId) -> PathBuf {
        self.dir.join(content_id.cover_file_name())
    }

    /// Makes sure a cover file exists for `content_id` and returns its path.
    ///
    /// An existing file is reused without touching the network. Otherwise the
    /// embedded picture is looked up in the first `prefix_cap_bytes` of the
    /// audio, then the advertised thumbnail is tried. `None` means no cover
    /// could be found, which is not an error for the caller.
    pub fn ensure_cover(&self, blob: &AudioBlob, content_id: &ContentId) -> Option<PathBuf> {
        let path = self.cover_path(content_id);
        if path.is_file() {
            debug!("cover for {content_id} already cached");
            return Some(path);
        }

        match self.embedded_cover(&blob.blob_id) {
            Ok(Some(image)) => match self.publish(&path, &image.data) {
                Ok(()) => {
                    info!("cover for {content_id}: embedded {}", image.mime_type);
                    return Some(path);
                }
                Err(e) => warn!("could not store embedded cover for {content_id}: {e}"),
            },
            Ok(None) => info!(
                "no embedded cover for {content_id} within first {} bytes",
                self.prefix_cap
            ),
            Err(e) => warn!("embedded cover lookup for {content_id} failed: {e}"),
        }

        let Some(thumbnail) = blob.thumbnail_blob_id.as_deref() else {
            info!("no cover for {content_id}: no thumbnail advertised");
            return None;
        };

        match self.thumbnail_cover(thumbnail, &path) {
            Ok(()) => {
                info!("cover for {content_id}: thumbnail");
                Some(path)
            }
            Err(e) => {
                warn!("thumbnail cover for {content_id} failed: {e}");
                None
            }
        }
    }

    fn embedded_cover(&self, blob_id: &str) -> Result<Option<EmbeddedImage>, CoverError> {
        let url = self.client.resolve_fetch_url(blob_id)?;
        let range = prefix_range(self.prefix_cap);
        let prefix = self
            .client
            .fetch_bytes(&url, Some(range.as_str()), self.prefix_cap)?;
        debug!("fetched {} leading bytes of {blob_id}", prefix.len());
        Ok(extract_embedded_image(&prefix))
    }

    fn thumbnail_cover(&self, thumbnail_blob_id: &str, path: &Path) -> Result<(), CoverError> {
        let url = self.client.resolve_fetch_url(thumbnail_blob_id)?;
        // one byte over the limit tells a full thumbnail from a cut one
        let data = self
            .client
            .fetch_bytes(&url, None, self.max_thumbnail_bytes + 1)?;

        if data.is_empty() {
            return Err(CoverError::EmptyThumbnail);
        }
        if data.len() as u64 > self.max_thumbnail_bytes {
            return Err(CoverError::ThumbnailTooLarge(self.max_thumbnail_bytes));
        }

        self.publish(path, &data)?;
        Ok(())
    }

    /// Writes `data` under a temporary name in the cache directory, then
    /// renames it over `path`.
    ///
    /// Readers see either no file or the complete one. The temporary file is
    /// removed on every failure path when it is dropped.
    fn publish(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".cover-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
