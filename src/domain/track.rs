use std::path::PathBuf;

use super::content_id::ContentId;

pub type TrackId = i64;

pub const UNKNOWN: &str = "Unknown";

/// Represent a registered audio upload
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub blob: AudioBlob,
    pub content_id: ContentId,
    pub metadata: TrackMetadata,
    pub user_id: i64,
    pub is_favorite: bool,
    /// `None` means no cover is available
    pub cover_path: Option<PathBuf>,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration: u32,
}

/// The remote side of an upload: the audio blob and the thumbnail the source
/// advertised for it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub blob_id: String,
    pub thumbnail_blob_id: Option<String>,
}

/// Track as announced by the ingestion side, before it gets a registry id.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub blob: AudioBlob,
    pub content_id: ContentId,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration: u32,
    pub user_id: i64,
}

impl NewTrack {
    pub fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            title: non_empty_or_unknown(self.title.as_deref()),
            artist: non_empty_or_unknown(self.artist.as_deref()),
            duration: self.duration,
        }
    }
}

fn non_empty_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}
