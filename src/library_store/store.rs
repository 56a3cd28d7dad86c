//! SQLite-backed library store.
//!
//! Owns the database connection, creates/validates/migrates the schema, and
//! provides everything the generic mapper cannot express: the album↔artist
//! junction, ordered playlist membership, the filesystem mirror used by the
//! scan boundary, the cover write paths and the per-user cache.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::error::StoreResult;
use super::kinds;
use super::mapper::Mapper;
use super::models::{Album, Artist, Bookmark, FileRecord, Genre, Playlist, Track};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;

#[derive(Clone)]
pub struct LibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl LibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open library database")?;

        if is_new_db {
            info!("Creating new library database at {:?}", path);
            LIBRARY_VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            if db_version < 1 {
                anyhow::bail!(
                    "Library database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let current_schema_version = LIBRARY_VERSIONED_SCHEMAS.last().unwrap().version as i64;

            let version_index = LIBRARY_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown library database version {}", db_version))?;
            LIBRARY_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Library database schema validation failed for version {}",
                        db_version
                    )
                })?;

            if db_version < current_schema_version {
                info!(
                    "Migrating library database from version {} to {}",
                    db_version, current_schema_version
                );
                Self::migrate_if_needed(&mut conn, db_version as usize)?;
            }
        }

        Ok(LibraryStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        LIBRARY_VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
        Ok(LibraryStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in LIBRARY_VERSIONED_SCHEMAS.iter() {
            if schema.version > from_version {
                info!(
                    "Running library database migration from version {} to {}",
                    latest_from, schema.version
                );
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
                latest_from = schema.version;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    // =========================================================================
    // Mapper accessors, one per entity kind
    // =========================================================================

    pub fn tracks(&self) -> Mapper<Track> {
        Mapper::new(self.conn.clone(), &kinds::TRACKS)
    }

    pub fn albums(&self) -> Mapper<Album> {
        Mapper::new(self.conn.clone(), &kinds::ALBUMS)
    }

    pub fn artists(&self) -> Mapper<Artist> {
        Mapper::new(self.conn.clone(), &kinds::ARTISTS)
    }

    pub fn genres(&self) -> Mapper<Genre> {
        Mapper::new(self.conn.clone(), &kinds::GENRES)
    }

    pub fn playlists(&self) -> Mapper<Playlist> {
        Mapper::new(self.conn.clone(), &kinds::PLAYLISTS)
    }

    pub fn bookmarks(&self) -> Mapper<Bookmark> {
        Mapper::new(self.conn.clone(), &kinds::BOOKMARKS)
    }

    // =========================================================================
    // Album <-> artist junction
    // =========================================================================

    /// Links a contributing artist to an album. The pair is checked before
    /// insert; returns false when it was already present.
    pub fn add_album_artist(&self, album_id: i64, artist_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM album_artists WHERE album_id = ?1 AND artist_id = ?2",
            params![album_id, artist_id],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO album_artists (album_id, artist_id) VALUES (?1, ?2)",
            params![album_id, artist_id],
        )?;
        Ok(true)
    }

    pub fn album_artist_ids(&self, album_id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT artist_id FROM album_artists WHERE album_id = ?1 ORDER BY artist_id")?;
        let ids = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // =========================================================================
    // Ordered playlist membership
    // =========================================================================

    pub fn playlist_track_ids(&self, playlist_id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![playlist_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Replaces a playlist's track sequence. The order of `track_ids` is the
    /// persisted order.
    pub fn set_playlist_track_ids(&self, playlist_id: i64, track_ids: &[i64]) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
        )?;
        for (position, track_id) in track_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO playlist_tracks (playlist_id, position, track_id) VALUES (?1, ?2, ?3)",
                params![playlist_id, position as i64, track_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetches a playlist row together with its ordered track ids.
    pub fn load_playlist(&self, id: i64, user_id: &str) -> StoreResult<Playlist> {
        let mut playlist = self.playlists().find(id, user_id)?;
        playlist.track_ids = self.playlist_track_ids(id)?;
        Ok(playlist)
    }

    // =========================================================================
    // Filesystem mirror (scan boundary)
    // =========================================================================

    fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            parent_id: row.get("parent_id")?,
            path: row.get("path")?,
            name: row.get("name")?,
            mimetype: row.get("mimetype")?,
            mtime: row.get("mtime")?,
        })
    }

    /// Registers or refreshes one filesystem entry, keyed by (user, path).
    /// Returns the entry's file id.
    pub fn upsert_file(&self, file: &mut FileRecord) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (user_id, parent_id, path, name, mimetype, mtime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, path) DO UPDATE SET
                 parent_id = ?2, name = ?4, mimetype = ?5, mtime = ?6",
            params![
                file.user_id,
                file.parent_id,
                file.path,
                file.name,
                file.mimetype,
                file.mtime
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM files WHERE user_id = ?1 AND path = ?2",
            params![file.user_id, file.path],
            |row| row.get(0),
        )?;
        file.id = Some(id);
        Ok(id)
    }

    pub fn file_by_path(&self, user_id: &str, path: &str) -> StoreResult<Option<FileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM files WHERE user_id = ?1 AND path = ?2")?;
        let file = stmt
            .query_row(params![user_id, path], Self::file_from_row)
            .optional()?;
        Ok(file)
    }

    /// All of a user's filesystem entries, optionally restricted to one
    /// folder subtree.
    pub fn files_under(&self, user_id: &str, folder: Option<&str>) -> StoreResult<Vec<FileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut files = Vec::new();
        match folder {
            Some(folder) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM files
                     WHERE user_id = ?1 AND (path = ?2 OR path LIKE ?2 || '/%')
                     ORDER BY id",
                )?;
                let rows = stmt.query_map(params![user_id, folder], Self::file_from_row)?;
                for row in rows {
                    files.push(row?);
                }
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM files WHERE user_id = ?1 ORDER BY id")?;
                let rows = stmt.query_map(params![user_id], Self::file_from_row)?;
                for row in rows {
                    files.push(row?);
                }
            }
        }
        Ok(files)
    }

    pub fn delete_files(&self, ids: &[i64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        conn.execute(
            &format!("DELETE FROM files WHERE id IN ({})", placeholders),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        Ok(())
    }

    // =========================================================================
    // Album cover write paths
    // =========================================================================

    pub fn album_ids_without_cover(&self, user_id: &str) -> StoreResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM albums WHERE user_id = ?1 AND cover_file_id IS NULL ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Image files sitting next to the album's tracks, in file-id order.
    pub fn cover_candidates(&self, user_id: &str, album_id: i64) -> StoreResult<Vec<FileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT f.* FROM files f
             WHERE f.user_id = ?1
               AND f.mimetype LIKE 'image/%'
               AND f.parent_id IN (
                   SELECT p.parent_id FROM tracks t
                   JOIN files p ON p.id = t.file_id AND p.user_id = t.user_id
                   WHERE t.user_id = ?1 AND t.album_id = ?2 AND p.parent_id IS NOT NULL
               )
             ORDER BY f.id",
        )?;
        let files = stmt
            .query_map(params![user_id, album_id], Self::file_from_row)?
            .collect::<rusqlite::Result<Vec<FileRecord>>>()?;
        Ok(files)
    }

    /// Writes a resolved cover, but only while the album has none. A cover
    /// that is already set never gets silently replaced.
    pub fn update_album_cover_if_unset(&self, album_id: i64, file_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE albums SET cover_file_id = ?1 WHERE id = ?2 AND cover_file_id IS NULL",
            params![file_id, album_id],
        )?;
        Ok(changed > 0)
    }

    pub fn remove_album_cover(&self, album_id: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE albums SET cover_file_id = NULL WHERE id = ?1",
            params![album_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Per-user cache
    // =========================================================================

    pub fn cache_set(&self, user_id: &str, key: &str, data: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache (user_id, key, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, key) DO UPDATE SET
                 data = ?3, updated = cast(strftime('%s','now') as int)",
            params![user_id, key, data],
        )?;
        Ok(())
    }

    pub fn cache_get(&self, user_id: &str, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM cache WHERE user_id = ?1 AND key = ?2")?;
        let data = stmt
            .query_row(params![user_id, key], |row| row.get(0))
            .optional()?;
        Ok(data)
    }
}
