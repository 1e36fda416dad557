use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The blob identifier could not be exchanged for a fetch url:
    /// it is unknown to the store, or the store was unreachable.
    #[error("could not resolve blob {blob_id}: {reason}")]
    Resolution { blob_id: String, reason: String },

    /// Network failure or non-2xx status while fetching bytes.
    #[error("upstream fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
}
