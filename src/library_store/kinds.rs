//! Entity kind configurations and identity resolvers.
//!
//! Each entity plugs its table layout and its notion of "the same row" into
//! the generic mapper. The resolvers answer one question: which existing
//! row, if any, carries the logical identity of this in-memory entity.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Value, Connection};

use super::error::{StoreError, StoreResult};
use super::mapper::{Entity, EntityKind};
use super::models::{Album, Artist, Bookmark, Genre, Playlist, Track};

fn parse_starred(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
    })
}

/// Runs an identity query that must match at most one row.
fn lookup_identity<P: rusqlite::Params>(
    conn: &Connection,
    entity: &'static str,
    sql: &str,
    params: P,
    key: String,
) -> StoreResult<Option<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    match ids.len() {
        0 => Ok(None),
        1 => Ok(Some(ids[0])),
        count => Err(StoreError::Ambiguous { entity, key, count }),
    }
}

// ---------------------------------------------------------------------------
// Track: identity = (user, backing file)
// ---------------------------------------------------------------------------

impl Entity for Track {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        number: row.get("number")?,
        disk: row.get("disk")?,
        artist_id: row.get("artist_id")?,
        album_id: row.get("album_id")?,
        genre_id: row.get("genre_id")?,
        file_id: row.get("file_id")?,
        length: row.get("length")?,
        bitrate: row.get("bitrate")?,
        mimetype: row.get("mimetype")?,
        scan_mtime: row.get("scan_mtime")?,
        starred: parse_starred(row.get("starred")?),
    })
}

fn track_to_values(track: &Track) -> Vec<Value> {
    vec![
        Value::from(track.user_id.clone()),
        Value::from(track.title.clone()),
        Value::from(track.number),
        Value::from(track.disk),
        Value::from(track.artist_id),
        Value::from(track.album_id),
        Value::from(track.genre_id),
        Value::from(track.file_id),
        Value::from(track.length),
        Value::from(track.bitrate),
        Value::from(track.mimetype.clone()),
        Value::from(track.scan_mtime),
    ]
}

fn track_identity(conn: &Connection, track: &Track) -> StoreResult<Option<i64>> {
    lookup_identity(
        conn,
        "track",
        "SELECT id FROM tracks WHERE user_id = ?1 AND file_id = ?2",
        params![track.user_id, track.file_id],
        format!("file {}", track.file_id),
    )
}

pub static TRACKS: EntityKind<Track> = EntityKind {
    entity: "track",
    table: "tracks",
    name_column: "title",
    columns: &[
        "user_id", "title", "number", "disk", "artist_id", "album_id", "genre_id", "file_id",
        "length", "bitrate", "mimetype", "scan_mtime",
    ],
    from_row: track_from_row,
    to_values: track_to_values,
    identity: track_identity,
};

// ---------------------------------------------------------------------------
// Album: identity = (user, album artist, name, year), null matching null
// ---------------------------------------------------------------------------

impl Entity for Album {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn album_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        year: row.get("year")?,
        disk_count: row.get("disk_count")?,
        album_artist_id: row.get("album_artist_id")?,
        cover_file_id: row.get("cover_file_id")?,
        starred: parse_starred(row.get("starred")?),
    })
}

// cover_file_id is deliberately absent: a resolved cover may only change
// through the remove-cover / update-cover operations on the store.
fn album_to_values(album: &Album) -> Vec<Value> {
    vec![
        Value::from(album.user_id.clone()),
        Value::from(album.name.clone()),
        Value::from(album.year),
        Value::from(album.disk_count),
        Value::from(album.album_artist_id),
    ]
}

fn album_identity(conn: &Connection, album: &Album) -> StoreResult<Option<i64>> {
    // IS instead of = so that null identity fields match null, not nothing
    lookup_identity(
        conn,
        "album",
        "SELECT id FROM albums
         WHERE user_id = ?1 AND album_artist_id IS ?2 AND name IS ?3 AND year IS ?4",
        params![album.user_id, album.album_artist_id, album.name, album.year],
        format!("name {:?} year {:?}", album.name, album.year),
    )
}

pub static ALBUMS: EntityKind<Album> = EntityKind {
    entity: "album",
    table: "albums",
    name_column: "name",
    columns: &["user_id", "name", "year", "disk_count", "album_artist_id"],
    from_row: album_from_row,
    to_values: album_to_values,
    identity: album_identity,
};

// ---------------------------------------------------------------------------
// Artist: identity = (user, lowercased name), null name its own class
// ---------------------------------------------------------------------------

impl Entity for Artist {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn artist_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        cover_file_id: row.get("cover_file_id")?,
        starred: parse_starred(row.get("starred")?),
    })
}

fn artist_to_values(artist: &Artist) -> Vec<Value> {
    vec![
        Value::from(artist.user_id.clone()),
        Value::from(artist.name.clone()),
        Value::from(artist.cover_file_id),
    ]
}

fn artist_identity(conn: &Connection, artist: &Artist) -> StoreResult<Option<i64>> {
    let lowered = artist.name.as_ref().map(|n| n.to_lowercase());
    lookup_identity(
        conn,
        "artist",
        "SELECT id FROM artists WHERE user_id = ?1 AND lower(name) IS ?2",
        params![artist.user_id, lowered],
        format!("name {:?}", artist.name),
    )
}

pub static ARTISTS: EntityKind<Artist> = EntityKind {
    entity: "artist",
    table: "artists",
    name_column: "name",
    columns: &["user_id", "name", "cover_file_id"],
    from_row: artist_from_row,
    to_values: artist_to_values,
    identity: artist_identity,
};

// ---------------------------------------------------------------------------
// Genre: identity = (user, lower_name)
// ---------------------------------------------------------------------------

impl Entity for Genre {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn genre_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Genre> {
    Ok(Genre {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        lower_name: row.get("lower_name")?,
        starred: parse_starred(row.get("starred")?),
    })
}

fn genre_to_values(genre: &Genre) -> Vec<Value> {
    vec![
        Value::from(genre.user_id.clone()),
        Value::from(genre.name.clone()),
        Value::from(genre.lower_name.clone()),
    ]
}

fn genre_identity(conn: &Connection, genre: &Genre) -> StoreResult<Option<i64>> {
    lookup_identity(
        conn,
        "genre",
        "SELECT id FROM genres WHERE user_id = ?1 AND lower_name = ?2",
        params![genre.user_id, genre.lower_name],
        format!("lower_name {}", genre.lower_name),
    )
}

pub static GENRES: EntityKind<Genre> = EntityKind {
    entity: "genre",
    table: "genres",
    name_column: "lower_name",
    columns: &["user_id", "name", "lower_name"],
    from_row: genre_from_row,
    to_values: genre_to_values,
    identity: genre_identity,
};

// ---------------------------------------------------------------------------
// Playlist: identity = (user, name)
// ---------------------------------------------------------------------------

impl Entity for Playlist {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn playlist_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        comment: row.get("comment")?,
        starred: parse_starred(row.get("starred")?),
        track_ids: Vec::new(),
    })
}

fn playlist_to_values(playlist: &Playlist) -> Vec<Value> {
    vec![
        Value::from(playlist.user_id.clone()),
        Value::from(playlist.name.clone()),
        Value::from(playlist.comment.clone()),
    ]
}

fn playlist_identity(conn: &Connection, playlist: &Playlist) -> StoreResult<Option<i64>> {
    lookup_identity(
        conn,
        "playlist",
        "SELECT id FROM playlists WHERE user_id = ?1 AND name = ?2",
        params![playlist.user_id, playlist.name],
        format!("name {}", playlist.name),
    )
}

pub static PLAYLISTS: EntityKind<Playlist> = EntityKind {
    entity: "playlist",
    table: "playlists",
    name_column: "name",
    columns: &["user_id", "name", "comment"],
    from_row: playlist_from_row,
    to_values: playlist_to_values,
    identity: playlist_identity,
};

// ---------------------------------------------------------------------------
// Bookmark: identity = (user, track) for track_id >= 0; every negative
// track_id addresses the user's single play-queue slot
// ---------------------------------------------------------------------------

impl Entity for Bookmark {
    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn bookmark_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        track_id: row.get("track_id")?,
        position: row.get("position")?,
        comment: row.get("comment")?,
        starred: parse_starred(row.get("starred")?),
    })
}

fn bookmark_to_values(bookmark: &Bookmark) -> Vec<Value> {
    vec![
        Value::from(bookmark.user_id.clone()),
        Value::from(bookmark.track_id),
        Value::from(bookmark.position),
        Value::from(bookmark.comment.clone()),
    ]
}

fn bookmark_identity(conn: &Connection, bookmark: &Bookmark) -> StoreResult<Option<i64>> {
    if bookmark.is_play_queue() {
        lookup_identity(
            conn,
            "bookmark",
            "SELECT id FROM bookmarks WHERE user_id = ?1 AND track_id < 0",
            params![bookmark.user_id],
            "play queue slot".to_string(),
        )
    } else {
        lookup_identity(
            conn,
            "bookmark",
            "SELECT id FROM bookmarks WHERE user_id = ?1 AND track_id = ?2",
            params![bookmark.user_id, bookmark.track_id],
            format!("track {}", bookmark.track_id),
        )
    }
}

pub static BOOKMARKS: EntityKind<Bookmark> = EntityKind {
    entity: "bookmark",
    table: "bookmarks",
    name_column: "comment",
    columns: &["user_id", "track_id", "position", "comment"],
    from_row: bookmark_from_row,
    to_values: bookmark_to_values,
    identity: bookmark_identity,
};
