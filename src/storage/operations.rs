use std::{path::Path, time::SystemTime};

use crate::{
    config,
    domain::{
        content_id::ContentId,
        track::{AudioBlob, NewTrack, Track, TrackId, TrackMetadata},
    },
    storage::{
        db::{self, system_time_to_i64},
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use rusqlite::{OptionalExtension, Row, params};
use tables::*;

/// Main structure that implements the track registry
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub id: i64,
    pub title: String,
    pub track_count: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Membership {
    Added,
    AlreadyPresent,
}

const TRACK_COLUMNS: &str = "id, file_id, unique_id, thumb_file_id, title, artist, duration, \
                             user_id, is_favorite, cover_path, added_at";

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        blob: AudioBlob {
            blob_id: row.get(1)?,
            thumbnail_blob_id: row.get(3)?,
        },
        content_id: ContentId::new(row.get::<_, String>(2)?),
        metadata: TrackMetadata {
            title: row.get(4)?,
            artist: row.get(5)?,
            duration: row.get(6)?,
        },
        user_id: row.get(7)?,
        is_favorite: row.get(8)?,
        cover_path: row.get::<_, Option<String>>(9)?.map(Into::into),
        added_at: row.get(10)?,
    })
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(db_config: config::Database) -> Result<Self, StorageError> {
        let db: rusqlite::Connection = db::open(&db_config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    /// Registers a freshly ingested upload. The cover is filled in later via
    /// [`Storage::set_cover_path`].
    pub fn insert_track(&mut self, track: &NewTrack) -> Result<TrackId, StorageError> {
        let added_at = system_time_to_i64(SystemTime::now()).map_err(StorageError::Internal)?;
        let meta = track.metadata();

        self.db.execute(
            &format!(
                "INSERT INTO {TRACKS} ({FILE_ID}, {UNIQUE_ID}, {THUMB_FILE_ID}, {TITLE}, {ARTIST}, \
                 {DURATION}, {USER_ID}, {ADDED_AT}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                track.blob.blob_id,
                track.content_id.as_str(),
                track.blob.thumbnail_blob_id,
                meta.title,
                meta.artist,
                meta.duration,
                track.user_id,
                added_at
            ],
        )?;

        Ok(self.db.last_insert_rowid())
    }

    pub fn get_track(&self, track_id: TrackId) -> Result<Track, StorageError> {
        self.db
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM {TRACKS} WHERE {ID} = ?1"),
                params![track_id],
                track_from_row,
            )
            .optional()?
            .ok_or(StorageError::TrackNotFound(track_id))
    }

    /// retrieves the remote blob identifier the audio of the track lives under
    pub fn get_blob_id(&self, track_id: TrackId) -> Result<String, StorageError> {
        self.db
            .query_row(
                &format!("SELECT {FILE_ID} FROM {TRACKS} WHERE {ID} = ?1"),
                params![track_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::TrackNotFound(track_id))
    }

    pub fn set_cover_path(&mut self, track_id: TrackId, path: &Path) -> Result<(), StorageError> {
        let updated = self.db.execute(
            &format!("UPDATE {TRACKS} SET {COVER_PATH} = ?1 WHERE {ID} = ?2"),
            params![path.to_string_lossy(), track_id],
        )?;
        if updated == 0 {
            return Err(StorageError::TrackNotFound(track_id));
        }
        Ok(())
    }

    /// All tracks, newest first
    pub fn list_tracks(&self) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM {TRACKS} ORDER BY {ID} DESC"
        ))?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    pub fn set_favorite(&mut self, track_id: TrackId, favorite: bool) -> Result<(), StorageError> {
        let updated = self.db.execute(
            &format!("UPDATE {TRACKS} SET {IS_FAVORITE} = ?1 WHERE {ID} = ?2"),
            params![favorite, track_id],
        )?;
        if updated == 0 {
            return Err(StorageError::TrackNotFound(track_id));
        }
        Ok(())
    }

    /// Deletes the track together with every playlist membership pointing at it.
    ///
    /// Returns false if there was nothing to delete.
    pub fn delete_track(&mut self, track_id: TrackId) -> Result<bool, StorageError> {
        let tx = self.db.transaction()?;

        tx.execute(
            &format!("DELETE FROM {PLAYLIST_TRACKS} WHERE {TRACK_ID} = ?1"),
            params![track_id],
        )?;
        let deleted = tx.execute(
            &format!("DELETE FROM {TRACKS} WHERE {ID} = ?1"),
            params![track_id],
        )?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn create_playlist(&mut self, title: &str, user_id: i64) -> Result<i64, StorageError> {
        self.db.execute(
            &format!("INSERT INTO {PLAYLISTS} ({TITLE}, {USER_ID}) VALUES (?1, ?2)"),
            params![title, user_id],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// Playlists with their track counts, newest first
    pub fn list_playlists(&self) -> Result<Vec<PlaylistEntry>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT p.{ID}, p.{TITLE}, COUNT(pt.{TRACK_ID})
             FROM {PLAYLISTS} p
             LEFT JOIN {PLAYLIST_TRACKS} pt ON pt.{PLAYLIST_ID} = p.{ID}
             GROUP BY p.{ID}
             ORDER BY p.{ID} DESC"
        ))?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(PlaylistEntry {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    track_count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    pub fn add_to_playlist(
        &mut self,
        playlist_id: i64,
        track_id: TrackId,
    ) -> Result<Membership, StorageError> {
        let tx = self.db.transaction()?;

        let playlist_exists = tx
            .query_row(
                &format!("SELECT 1 FROM {PLAYLISTS} WHERE {ID} = ?1"),
                params![playlist_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !playlist_exists {
            return Err(StorageError::PlaylistNotFound(playlist_id));
        }

        let track_exists = tx
            .query_row(
                &format!("SELECT 1 FROM {TRACKS} WHERE {ID} = ?1"),
                params![track_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !track_exists {
            return Err(StorageError::TrackNotFound(track_id));
        }

        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {PLAYLIST_TRACKS} ({PLAYLIST_ID}, {TRACK_ID}) VALUES (?1, ?2)"
            ),
            params![playlist_id, track_id],
        )?;

        tx.commit()?;

        Ok(if inserted == 0 {
            Membership::AlreadyPresent
        } else {
            Membership::Added
        })
    }

    pub fn playlist_tracks(&self, playlist_id: i64) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM {TRACKS}
             WHERE {ID} IN (SELECT {TRACK_ID} FROM {PLAYLIST_TRACKS} WHERE {PLAYLIST_ID} = ?1)
             ORDER BY {ID} DESC"
        ))?;
        let tracks = stmt
            .query_map(params![playlist_id], track_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }
}
