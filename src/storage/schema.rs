use rusqlite::Connection;

pub mod tables {
    pub const TRACKS: &str = "tracks";
    pub const PLAYLISTS: &str = "playlists";
    pub const PLAYLIST_TRACKS: &str = "playlist_tracks";

    #[cfg(test)]
    pub const ALL_TABLES: &[&str] = &[TRACKS, PLAYLISTS, PLAYLIST_TRACKS];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const FILE_ID: &str = "file_id";
    pub const UNIQUE_ID: &str = "unique_id";
    pub const THUMB_FILE_ID: &str = "thumb_file_id";
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const DURATION: &str = "duration";
    pub const USER_ID: &str = "user_id";
    pub const IS_FAVORITE: &str = "is_favorite";
    pub const COVER_PATH: &str = "cover_path";
    pub const ADDED_AT: &str = "added_at";
    pub const PLAYLIST_ID: &str = "playlist_id";
    pub const TRACK_ID: &str = "track_id";
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id TEXT NOT NULL,
    unique_id TEXT NOT NULL,
    thumb_file_id TEXT,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NOT NULL,
    is_favorite BOOLEAN NOT NULL DEFAULT 0,
    cover_path TEXT,
    added_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS playlists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    user_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS playlist_tracks (
    playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    UNIQUE (playlist_id, track_id)
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
