//! SQLite schema for the per-user media library.
//!
//! Entity identities are enforced with unique indices on the natural-key
//! expressions; `insert_or_update` relies on these firing to detect that a
//! row with the same identity already exists. There are no foreign key
//! clauses: cross-table integrity is restored by the maintenance sweep.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("number", &SqlType::Integer),
        sqlite_column!("disk", &SqlType::Integer),
        sqlite_column!("artist_id", &SqlType::Integer),
        sqlite_column!("album_id", &SqlType::Integer),
        sqlite_column!("genre_id", &SqlType::Integer),
        sqlite_column!("file_id", &SqlType::Integer, non_null = true),
        sqlite_column!("length", &SqlType::Integer), // seconds
        sqlite_column!("bitrate", &SqlType::Integer),
        sqlite_column!("mimetype", &SqlType::Text),
        sqlite_column!("scan_mtime", &SqlType::Integer),
        sqlite_column!("starred", &SqlType::Text), // RFC3339
    ],
    indices: &[
        ("idx_tracks_user", "user_id"),
        ("idx_tracks_album", "album_id"),
        ("idx_tracks_artist", "artist_id"),
    ],
    unique_indices: &[("uniq_tracks_file", "user_id, file_id")],
};

/// Album identity is (user, album artist, name, year) with SQL null matching
/// SQL null. SQLite unique indices treat nulls as distinct, so the identity
/// columns go through ifnull sentinels; the scan boundary normalizes empty
/// tag strings to null so the '' sentinel cannot collide with real names.
const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("disk_count", &SqlType::Integer),
        sqlite_column!("album_artist_id", &SqlType::Integer),
        sqlite_column!("cover_file_id", &SqlType::Integer),
        sqlite_column!("starred", &SqlType::Text),
    ],
    indices: &[
        ("idx_albums_user", "user_id"),
        ("idx_albums_artist", "album_artist_id"),
    ],
    unique_indices: &[(
        "uniq_albums_identity",
        "user_id, ifnull(album_artist_id, -1), ifnull(name, ''), ifnull(year, -1)",
    )],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("cover_file_id", &SqlType::Integer),
        sqlite_column!("starred", &SqlType::Text),
    ],
    indices: &[("idx_artists_user", "user_id")],
    unique_indices: &[("uniq_artists_name", "user_id, ifnull(lower(name), '')")],
};

/// Contributing artists per album, unordered. Duplicate pairs are checked
/// before insert; the unique index is the schema-level backstop.
const ALBUM_ARTISTS_TABLE: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_artists_artist", "artist_id")],
    unique_indices: &[("uniq_album_artists", "album_id, artist_id")],
};

const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("lower_name", &SqlType::Text, non_null = true),
        sqlite_column!("starred", &SqlType::Text),
    ],
    indices: &[("idx_genres_user", "user_id")],
    unique_indices: &[("uniq_genres_identity", "user_id, lower_name")],
};

const PLAYLISTS_TABLE: Table = Table {
    name: "playlists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("starred", &SqlType::Text),
    ],
    indices: &[("idx_playlists_user", "user_id")],
    unique_indices: &[("uniq_playlists_name", "user_id, name")],
};

/// Ordered playlist membership; position is an explicit sequence, not a
/// derived sort key.
const PLAYLIST_TRACKS_TABLE: Table = Table {
    name: "playlist_tracks",
    columns: &[
        sqlite_column!("playlist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("track_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_playlist_tracks_playlist", "playlist_id")],
    unique_indices: &[],
};

/// One bookmark per (user, track), with all negative track ids collapsing
/// into the user's single play-queue slot.
const BOOKMARKS_TABLE: Table = Table {
    name: "bookmarks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("starred", &SqlType::Text),
    ],
    indices: &[("idx_bookmarks_user", "user_id")],
    unique_indices: &[(
        "uniq_bookmarks_slot",
        "user_id, CASE WHEN track_id < 0 THEN -1 ELSE track_id END",
    )],
};

/// Filesystem mirror maintained by the scan boundary.
const FILES_TABLE: Table = Table {
    name: "files",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("parent_id", &SqlType::Integer),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("mimetype", &SqlType::Text, non_null = true),
        sqlite_column!("mtime", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_files_parent", "parent_id")],
    unique_indices: &[("uniq_files_path", "user_id, path")],
};

/// Opaque per-user key/value blobs. Unrelated to the integrity logic but
/// wiped together with the rest of the library on reset.
const CACHE_TABLE: Table = Table {
    name: "cache",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("key", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_indices: &[("uniq_cache_key", "user_id, key")],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        TRACKS_TABLE,
        ALBUMS_TABLE,
        ARTISTS_TABLE,
        ALBUM_ARTISTS_TABLE,
        GENRES_TABLE,
        PLAYLISTS_TABLE,
        PLAYLIST_TRACKS_TABLE,
        BOOKMARKS_TABLE,
        FILES_TABLE,
        CACHE_TABLE,
    ],
    migration: None,
}];
