//! Consistency maintenance: the orphan sweep and the full-wipe reset.
//!
//! The sweep restores referential integrity after arbitrary insert/delete
//! activity. Each step is one anti-join DELETE (or UPDATE for covers) that
//! is self-consistent at the moment it executes; no snapshot transaction is
//! required across steps. The order is fixed: tracks are pruned before
//! albums and artists, because an album or artist is only known to be
//! orphaned once the tracks that justified it are gone. A failing step
//! aborts the sweep, since later steps would anti-join against stale state.

use rusqlite::params;
use serde::Serialize;
use tracing::info;

use crate::library_store::{LibraryStore, StoreResult};

/// Rows removed per category by one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Album cover references cleared (the albums themselves survive).
    pub covers: usize,
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.covers + self.tracks + self.albums + self.artists
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

pub fn run_sweep(store: &LibraryStore) -> StoreResult<SweepReport> {
    let conn = store.connection().lock().unwrap();

    // 1. Stale cover references: clear, do not delete the album
    let covers = conn.execute(
        "UPDATE albums SET cover_file_id = NULL
         WHERE cover_file_id IS NOT NULL
           AND NOT EXISTS (
               SELECT 1 FROM files f
               WHERE f.id = albums.cover_file_id AND f.user_id = albums.user_id
           )",
        params![],
    )?;

    // 2. Tracks whose backing file is gone
    let tracks_no_file = conn.execute(
        "DELETE FROM tracks
         WHERE NOT EXISTS (
             SELECT 1 FROM files f
             WHERE f.id = tracks.file_id AND f.user_id = tracks.user_id
         )",
        params![],
    )?;

    // 3. Tracks whose album is gone (a null album reference is not an orphan)
    let tracks_no_album = conn.execute(
        "DELETE FROM tracks
         WHERE album_id IS NOT NULL
           AND NOT EXISTS (
               SELECT 1 FROM albums a
               WHERE a.id = tracks.album_id AND a.user_id = tracks.user_id
           )",
        params![],
    )?;

    // 4. Tracks whose artist is gone
    let tracks_no_artist = conn.execute(
        "DELETE FROM tracks
         WHERE artist_id IS NOT NULL
           AND NOT EXISTS (
               SELECT 1 FROM artists a
               WHERE a.id = tracks.artist_id AND a.user_id = tracks.user_id
           )",
        params![],
    )?;

    // 5. Albums with zero remaining tracks, plus their junction rows
    let albums = conn.execute(
        "DELETE FROM albums
         WHERE NOT EXISTS (SELECT 1 FROM tracks t WHERE t.album_id = albums.id)",
        params![],
    )?;
    conn.execute(
        "DELETE FROM album_artists
         WHERE album_id NOT IN (SELECT id FROM albums)",
        params![],
    )?;

    // 6. Artists referenced neither as an album's primary artist nor as any
    //    track's performer
    let artists = conn.execute(
        "DELETE FROM artists
         WHERE NOT EXISTS (SELECT 1 FROM albums a WHERE a.album_artist_id = artists.id)
           AND NOT EXISTS (SELECT 1 FROM tracks t WHERE t.artist_id = artists.id)",
        params![],
    )?;
    conn.execute(
        "DELETE FROM album_artists
         WHERE artist_id NOT IN (SELECT id FROM artists)",
        params![],
    )?;

    let report = SweepReport {
        covers,
        tracks: tracks_no_file + tracks_no_album + tracks_no_artist,
        albums,
        artists,
    };
    info!(
        "Sweep removed {} covers, {} tracks, {} albums, {} artists",
        report.covers, report.tracks, report.albums, report.artists
    );
    Ok(report)
}

/// Which users a reset applies to.
#[derive(Debug, Clone)]
pub enum ResetScope<'a> {
    All,
    Users(&'a [String]),
}

/// Unconditionally wipes library data: tracks, albums, artists, junction
/// rows, genres, playlists with their sequences, bookmarks and cache
/// entries. The filesystem mirror is the host's state and stays.
pub fn reset_library(store: &LibraryStore, scope: ResetScope) -> StoreResult<()> {
    let mut conn = store.connection().lock().unwrap();
    let tx = conn.transaction()?;

    match scope {
        ResetScope::All => {
            for table in [
                "album_artists",
                "playlist_tracks",
                "tracks",
                "albums",
                "artists",
                "genres",
                "playlists",
                "bookmarks",
                "cache",
            ] {
                tx.execute(&format!("DELETE FROM {}", table), params![])?;
            }
            info!("Reset library data for all users");
        }
        ResetScope::Users(users) => {
            for user_id in users {
                // Junction and sequence rows first: they carry no user_id of
                // their own and are reachable only through the owning rows
                tx.execute(
                    "DELETE FROM album_artists
                     WHERE album_id IN (SELECT id FROM albums WHERE user_id = ?1)",
                    params![user_id],
                )?;
                tx.execute(
                    "DELETE FROM playlist_tracks
                     WHERE playlist_id IN (SELECT id FROM playlists WHERE user_id = ?1)",
                    params![user_id],
                )?;
                for table in [
                    "tracks",
                    "albums",
                    "artists",
                    "genres",
                    "playlists",
                    "bookmarks",
                    "cache",
                ] {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE user_id = ?1", table),
                        params![user_id],
                    )?;
                }
                info!("Reset library data for user {}", user_id);
            }
        }
    }

    tx.commit()?;
    Ok(())
}
