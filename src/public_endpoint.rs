use std::path::Path;

use crate::{config::PublicEndpoint, domain::track::TrackId};

fn base(conf: &PublicEndpoint) -> &str {
    conf.base_url.trim_end_matches('/')
}

/// url the player fetches audio from
pub fn stream_url(conf: &PublicEndpoint, track: TrackId) -> String {
    format!("{}/stream/{track}", base(conf))
}

/// url a cached cover is served under, `None` when the track has no cover
pub fn cover_url(conf: &PublicEndpoint, cover_path: Option<&Path>) -> Option<String> {
    let file_name = cover_path?.file_name()?.to_string_lossy();
    Some(format!("{}/covers/{file_name}", base(conf)))
}
