//! Entity records of the media library.
//!
//! Plain typed structs, one per entity kind. Every entity is owned by
//! exactly one user; `id` is `None` until the row has been inserted.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sort order for `find_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Implementation order, whatever the store returns.
    #[default]
    None,
    /// Case-insensitive lexicographic on the entity's name column.
    Name,
    /// Descending by id. Rowids grow monotonically, so this is a
    /// creation-order proxy, not a timestamp sort.
    Newest,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Track {
    pub id: Option<i64>,
    pub user_id: String,
    pub title: String,
    pub number: Option<i64>,
    pub disk: Option<i64>,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub file_id: i64,
    /// Length in seconds.
    pub length: Option<i64>,
    pub bitrate: Option<i64>,
    pub mimetype: Option<String>,
    /// File mtime recorded when the track was last scanned; the dirty
    /// classifier compares it against the file mirror.
    pub scan_mtime: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Album {
    pub id: Option<i64>,
    pub user_id: String,
    /// Nullable: "unknown album" is a valid identity of its own.
    pub name: Option<String>,
    pub year: Option<i64>,
    pub disk_count: Option<i64>,
    /// The distinguished primary artist. Contributing artists live in the
    /// album_artists junction.
    pub album_artist_id: Option<i64>,
    /// Null until cover resolution has run for this album.
    pub cover_file_id: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Artist {
    pub id: Option<i64>,
    pub user_id: String,
    pub name: Option<String>,
    pub cover_file_id: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Genre {
    pub id: Option<i64>,
    pub user_id: String,
    pub name: String,
    /// Case-insensitive identity and sort key, kept alongside the display
    /// name so the unique index and ORDER BY hit a plain column.
    pub lower_name: String,
    pub starred: Option<DateTime<Utc>>,
}

impl Genre {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Genre {
            id: None,
            user_id: user_id.into(),
            lower_name: name.to_lowercase(),
            name,
            starred: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Playlist {
    pub id: Option<i64>,
    pub user_id: String,
    pub name: String,
    pub comment: Option<String>,
    pub starred: Option<DateTime<Utc>>,
    /// Ordered track ids. Not written by the generic mapper; loaded and
    /// stored through the playlist-track operations on `LibraryStore`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub track_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Bookmark {
    pub id: Option<i64>,
    pub user_id: String,
    /// Negative values address the user's single play-queue slot instead of
    /// a concrete track.
    pub track_id: i64,
    /// Seek offset in milliseconds.
    pub position: i64,
    pub comment: Option<String>,
    pub starred: Option<DateTime<Utc>>,
}

impl Bookmark {
    pub fn is_play_queue(&self) -> bool {
        self.track_id < 0
    }
}

/// Mirror of one host filesystem entry (file or folder). Maintained by the
/// scan boundary; the sweep's anti-joins and the cover heuristic read it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub user_id: String,
    /// File id of the containing folder row, if any.
    pub parent_id: Option<i64>,
    pub path: String,
    pub name: String,
    pub mimetype: String,
    pub mtime: i64,
}

impl FileRecord {
    pub fn is_audio(&self) -> bool {
        self.mimetype.starts_with("audio/")
    }

    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_new_lowercases_identity() {
        let genre = Genre::new("alice", "Post-Rock");
        assert_eq!(genre.name, "Post-Rock");
        assert_eq!(genre.lower_name, "post-rock");
        assert!(genre.id.is_none());
    }

    #[test]
    fn test_bookmark_play_queue_zone() {
        let normal = Bookmark {
            user_id: "alice".to_string(),
            track_id: 17,
            ..Default::default()
        };
        let queue = Bookmark {
            user_id: "alice".to_string(),
            track_id: -1,
            ..Default::default()
        };
        assert!(!normal.is_play_queue());
        assert!(queue.is_play_queue());
    }
}
