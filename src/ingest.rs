use std::path::PathBuf;

use log::info;

use crate::{
    covers::CoverExtractor,
    domain::track::{NewTrack, Track, TrackId},
    storage::{self, SharedStorage, error::StorageError},
};

/// Registers new uploads and attaches their covers.
pub struct Ingestor {
    storage: SharedStorage,
    covers: CoverExtractor,
}

impl Ingestor {
    pub fn new(storage: SharedStorage, covers: CoverExtractor) -> Self {
        Self { storage, covers }
    }

    /// Registers the track, then looks for a cover.
    ///
    /// Finding no cover is fine: the track stays registered without one.
    pub fn ingest(&self, track: NewTrack) -> Result<Track, StorageError> {
        let id = storage::lock(&self.storage)?.insert_track(&track)?;
        let metadata = track.metadata();
        info!(
            "registered track {id} ({} - {})",
            metadata.artist, metadata.title
        );

        if let Some(path) = self.covers.ensure_cover(&track.blob, &track.content_id) {
            storage::lock(&self.storage)?.set_cover_path(id, &path)?;
        }

        storage::lock(&self.storage)?.get_track(id)
    }

    /// Runs cover extraction again for an already registered track
    pub fn refresh_cover(&self, track_id: TrackId) -> Result<Option<PathBuf>, StorageError> {
        let track = storage::lock(&self.storage)?.get_track(track_id)?;

        let cover = self.covers.ensure_cover(&track.blob, &track.content_id);
        if let Some(path) = &cover {
            storage::lock(&self.storage)?.set_cover_path(track_id, path)?;
        }
        Ok(cover)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use id3::{
        Tag, TagLike, Version,
        frame::{Picture, PictureType},
    };
    use tempfile::tempdir;

    use super::*;
    use crate::{
        config::CoversConfig,
        domain::{content_id::ContentId, track::AudioBlob},
        remote::{
            RemoteBlobClient,
            mock::{MockUpstream, unreachable_config},
        },
        storage::{operations::Storage, schema},
    };

    const COVER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x42, 0xFF, 0xD9];

    fn audio_with_cover() -> anyhow::Result<Vec<u8>> {
        let mut tag = Tag::new();
        tag.add_frame(Picture {
            mime_type: "image/jpeg".into(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: COVER.to_vec(),
        });
        let mut file = Vec::new();
        tag.write_to(&mut file, Version::Id3v24)?;
        file.extend([0x55; 4096]);
        Ok(file)
    }

    fn new_track(thumb: Option<&str>) -> NewTrack {
        NewTrack {
            blob: AudioBlob {
                blob_id: "song".into(),
                thumbnail_blob_id: thumb.map(String::from),
            },
            content_id: ContentId::new("uniq"),
            title: Some("Song".into()),
            artist: None,
            duration: 215,
            user_id: 99,
        }
    }

    fn ingestor(client: RemoteBlobClient, covers_dir: &std::path::Path) -> anyhow::Result<Ingestor> {
        let conn = rusqlite::Connection::open_in_memory()?;
        schema::init(&conn)?;
        let covers = CoverExtractor::new(
            Arc::new(client),
            &CoversConfig {
                dir: covers_dir.to_path_buf(),
                ..Default::default()
            },
        )?;
        Ok(Ingestor::new(
            storage::shared(Storage::from_existing_conn(conn)),
            covers,
        ))
    }

    #[test]
    fn test_ingest_attaches_embedded_cover() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let upstream = MockUpstream::start().with_file("song", audio_with_cover()?);
        let ingestor = ingestor(upstream.client()?, dir.path())?;

        let track = ingestor.ingest(new_track(None))?;

        let cover = track.cover_path.expect("cover expected");
        assert_eq!(cover, dir.path().join("uniq.jpg"));
        assert_eq!(fs::read(cover)?, COVER);
        assert_eq!(track.metadata.artist, "Unknown");
        assert_eq!(track.metadata.duration, 215);
        Ok(())
    }

    #[test]
    fn test_ingest_succeeds_without_any_cover() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let ingestor = ingestor(RemoteBlobClient::new(&unreachable_config())?, dir.path())?;

        let track = ingestor.ingest(new_track(None))?;

        assert_eq!(track.cover_path, None);
        let stored = storage::lock(&ingestor.storage)?.get_track(track.id)?;
        assert_eq!(stored.cover_path, None);
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_refresh_cover_fills_missing_cover() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let upstream = MockUpstream::start().with_file("thumb", vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let ingestor = ingestor(upstream.client()?, dir.path())?;

        // the audio blob is unknown upstream and no thumbnail was announced yet
        let track = ingestor.ingest(new_track(None))?;
        assert_eq!(track.cover_path, None);

        storage::lock(&ingestor.storage)?.db.execute(
            "UPDATE tracks SET thumb_file_id = 'thumb' WHERE id = ?1",
            [track.id],
        )?;

        let cover = ingestor.refresh_cover(track.id)?;

        assert_eq!(cover, Some(dir.path().join("uniq.jpg")));
        assert_eq!(
            storage::lock(&ingestor.storage)?.get_track(track.id)?.cover_path,
            cover
        );
        Ok(())
    }

    #[test]
    fn test_refresh_cover_unknown_track() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let ingestor = ingestor(RemoteBlobClient::new(&unreachable_config())?, dir.path())?;

        assert!(matches!(
            ingestor.refresh_cover(1234),
            Err(StorageError::TrackNotFound(1234))
        ));
        Ok(())
    }
}
