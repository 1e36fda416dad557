//! Access to the remote blob store: identifier resolution and byte-range fetches.

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{FetchUrl, RemoteBlobClient, UpstreamResponse, prefix_range};
pub use error::RemoteError;
