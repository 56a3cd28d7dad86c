//! Scan boundary.
//!
//! Tag extraction happens outside this crate; its output arrives as a JSON
//! manifest listing files with their already-extracted metadata bundles.
//! This module synchronizes the filesystem mirror from the manifest,
//! classifies files into unscanned / dirty / obsolete, and drives the
//! upserts that turn metadata bundles into Track/Album/Artist/Genre rows.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cover_art::resolve_covers;
use crate::library_store::{
    Album, Artist, FileRecord, Genre, LibraryStore, StoreResult, Track,
};
use crate::maintenance::{run_sweep, SweepReport};

pub const DIRECTORY_MIMETYPE: &str = "httpd/unix-directory";

/// One extracted metadata bundle, as produced by the external extraction
/// step. All fields optional: a file with unreadable tags is still a track.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub disk_number: Option<i64>,
    /// Length in seconds.
    pub length: Option<i64>,
    pub bitrate: Option<i64>,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub mtime: i64,
    pub mimetype: String,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
}

impl ManifestFile {
    fn is_audio(&self) -> bool {
        self.mimetype.starts_with("audio/")
    }
}

/// Authoritative listing of the scanned subtree. Files under the scan root
/// that the manifest no longer lists are removed from the mirror, which is
/// how their tracks become obsolete.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanManifest {
    pub user: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Re-process every known audio file, not just unscanned/dirty ones.
    pub rescan: bool,
    /// Leave dirty files alone, process only unscanned ones.
    pub skip_dirty: bool,
    /// Delete tracks whose files are gone and run the maintenance sweep.
    pub clean_obsolete: bool,
    /// Skip cover art resolution.
    pub skip_art: bool,
    /// Restrict the scan to files under this folder.
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScanReport {
    pub processed: usize,
    pub skipped: usize,
    pub covers_resolved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<SweepReport>,
}

/// Scan-state classification over the filesystem mirror.
/// `unscanned` and `dirty` carry file ids, `obsolete` carries track ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanClassification {
    pub unscanned: Vec<i64>,
    pub dirty: Vec<i64>,
    pub obsolete: Vec<i64>,
}

fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn title_from_path(path: &str) -> String {
    let name = file_name(path);
    name.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(name)
        .to_string()
}

/// Empty tag values carry no identity; they normalize to null so they meet
/// the null identity classes instead of colliding with the '' sentinels in
/// the unique indices.
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Classifies the user's library state. Unscanned: audio files with no
/// track row. Dirty: files whose mtime differs from the one recorded at
/// scan time. Obsolete: tracks whose backing file row is gone.
pub fn classify(store: &LibraryStore, user_id: &str) -> StoreResult<ScanClassification> {
    let conn = store.connection().lock().unwrap();

    let mut stmt = conn.prepare(
        "SELECT f.id FROM files f
         WHERE f.user_id = ?1 AND f.mimetype LIKE 'audio/%'
           AND NOT EXISTS (
               SELECT 1 FROM tracks t WHERE t.user_id = f.user_id AND t.file_id = f.id
           )
         ORDER BY f.id",
    )?;
    let unscanned = stmt
        .query_map(rusqlite::params![user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let mut stmt = conn.prepare(
        "SELECT f.id FROM files f
         JOIN tracks t ON t.file_id = f.id AND t.user_id = f.user_id
         WHERE f.user_id = ?1
           AND (t.scan_mtime IS NULL OR t.scan_mtime <> f.mtime)
         ORDER BY f.id",
    )?;
    let dirty = stmt
        .query_map(rusqlite::params![user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let mut stmt = conn.prepare(
        "SELECT t.id FROM tracks t
         WHERE t.user_id = ?1
           AND NOT EXISTS (
               SELECT 1 FROM files f WHERE f.id = t.file_id AND f.user_id = t.user_id
           )
         ORDER BY t.id",
    )?;
    let obsolete = stmt
        .query_map(rusqlite::params![user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    Ok(ScanClassification {
        unscanned,
        dirty,
        obsolete,
    })
}

/// Creates/refreshes the folder chain for `path`, returning the folder's
/// file id. The id cache lives for one sync call and is passed explicitly.
fn ensure_folder(
    store: &LibraryStore,
    user_id: &str,
    path: &str,
    folder_ids: &mut HashMap<String, i64>,
) -> StoreResult<i64> {
    if let Some(id) = folder_ids.get(path) {
        return Ok(*id);
    }
    let parent_id = match parent_path(path) {
        Some(parent) if !parent.is_empty() => {
            Some(ensure_folder(store, user_id, parent, folder_ids)?)
        }
        _ => None,
    };
    let mut folder = FileRecord {
        id: None,
        user_id: user_id.to_string(),
        parent_id,
        path: path.to_string(),
        name: file_name(path).to_string(),
        mimetype: DIRECTORY_MIMETYPE.to_string(),
        mtime: 0,
    };
    let id = store.upsert_file(&mut folder)?;
    folder_ids.insert(path.to_string(), id);
    Ok(id)
}

/// Synchronizes the filesystem mirror from the manifest and returns the
/// manifest entries keyed by their file ids. Mirror rows under the scan
/// root that the manifest does not list (and that are not ancestors of a
/// listed path) are deleted.
fn sync_files<'a>(
    store: &LibraryStore,
    manifest: &'a ScanManifest,
    folder: Option<&str>,
) -> StoreResult<HashMap<i64, &'a ManifestFile>> {
    let mut folder_ids: HashMap<String, i64> = HashMap::new();
    let mut by_file_id: HashMap<i64, &ManifestFile> = HashMap::new();
    let mut keep: HashSet<String> = HashSet::new();

    for entry in &manifest.files {
        if let Some(folder) = folder {
            let inside = entry.path == folder || entry.path.starts_with(&format!("{}/", folder));
            if !inside {
                continue;
            }
        }
        let parent_id = match parent_path(&entry.path) {
            Some(parent) if !parent.is_empty() => {
                Some(ensure_folder(store, &manifest.user, parent, &mut folder_ids)?)
            }
            _ => None,
        };
        let mut file = FileRecord {
            id: None,
            user_id: manifest.user.clone(),
            parent_id,
            path: entry.path.clone(),
            name: file_name(&entry.path).to_string(),
            mimetype: entry.mimetype.clone(),
            mtime: entry.mtime,
        };
        let id = store.upsert_file(&mut file)?;
        by_file_id.insert(id, entry);
        keep.insert(entry.path.clone());
    }

    // Folder rows on the way to a kept path stay too
    for path in keep.clone() {
        let mut current = path.as_str();
        while let Some(parent) = parent_path(current) {
            if parent.is_empty() {
                break;
            }
            keep.insert(parent.to_string());
            current = parent;
        }
    }

    let existing = store.files_under(&manifest.user, folder)?;
    let stale: Vec<i64> = existing
        .iter()
        .filter(|f| !keep.contains(&f.path))
        .filter_map(|f| f.id)
        .collect();
    store.delete_files(&stale)?;

    Ok(by_file_id)
}

pub struct Scanner<'a> {
    store: &'a LibraryStore,
}

impl<'a> Scanner<'a> {
    pub fn new(store: &'a LibraryStore) -> Self {
        Scanner { store }
    }

    pub fn run(&self, manifest: &ScanManifest, options: &ScanOptions) -> StoreResult<ScanReport> {
        info!(
            "Scanning library of {} ({} manifest entries)",
            manifest.user,
            manifest.files.len()
        );
        let by_file_id = sync_files(self.store, manifest, options.folder.as_deref())?;
        let classification = classify(self.store, &manifest.user)?;

        let mut to_process: BTreeSet<i64> = classification.unscanned.iter().copied().collect();
        let mut skipped = 0;
        if options.rescan {
            for (file_id, entry) in &by_file_id {
                if entry.is_audio() {
                    to_process.insert(*file_id);
                }
            }
        } else if options.skip_dirty {
            skipped += classification.dirty.len();
        } else {
            to_process.extend(classification.dirty.iter().copied());
        }

        let mut processed = 0;
        for file_id in to_process {
            match by_file_id.get(&file_id) {
                Some(entry) => {
                    self.import_file(&manifest.user, file_id, entry)?;
                    processed += 1;
                }
                // Known in the mirror but not covered by this manifest
                // (e.g. outside --folder): left for a later scan
                None => skipped += 1,
            }
        }

        let removed = if options.clean_obsolete {
            self.store.tracks().delete_by_ids(&classification.obsolete)?;
            Some(run_sweep(self.store)?)
        } else {
            None
        };

        let covers_resolved = if options.skip_art {
            0
        } else {
            resolve_covers(self.store, &manifest.user)?
        };

        info!(
            "Scan of {} finished: {} processed, {} skipped",
            manifest.user, processed, skipped
        );
        Ok(ScanReport {
            processed,
            skipped,
            covers_resolved,
            removed,
        })
    }

    fn upsert_artist(&self, user_id: &str, name: &str) -> StoreResult<Option<i64>> {
        let mut artist = Artist {
            user_id: user_id.to_string(),
            name: Some(name.to_string()),
            ..Default::default()
        };
        self.store.artists().insert_or_update(&mut artist)?;
        Ok(artist.id)
    }

    /// Upserts the entity graph for one audio file: performer, album artist,
    /// album (+junction links), genre, then the track itself. Every step
    /// goes through `insert_or_update`, so re-importing is idempotent and
    /// concurrent scans converge on the same rows.
    fn import_file(&self, user_id: &str, file_id: i64, entry: &ManifestFile) -> StoreResult<()> {
        let meta = entry.metadata.clone().unwrap_or_default();

        let performer = normalize(meta.artist);
        let album_artist = normalize(meta.album_artist).or_else(|| performer.clone());

        let performer_id = match &performer {
            Some(name) => self.upsert_artist(user_id, name)?,
            None => None,
        };
        let album_artist_id = match &album_artist {
            Some(name) if performer.as_deref() != Some(name.as_str()) => {
                self.upsert_artist(user_id, name)?
            }
            Some(_) => performer_id,
            None => None,
        };

        let mut album = Album {
            user_id: user_id.to_string(),
            name: normalize(meta.album),
            year: meta.year,
            disk_count: meta.disk_number,
            album_artist_id,
            ..Default::default()
        };
        self.store.albums().insert_or_update(&mut album)?;

        if let Some(album_id) = album.id {
            for artist_id in [performer_id, album_artist_id].into_iter().flatten() {
                self.store.add_album_artist(album_id, artist_id)?;
            }
        }

        let genre_id = match normalize(meta.genre) {
            Some(name) => {
                let mut genre = Genre::new(user_id, name);
                self.store.genres().insert_or_update(&mut genre)?;
                genre.id
            }
            None => None,
        };

        let mut track = Track {
            id: None,
            user_id: user_id.to_string(),
            title: normalize(meta.title).unwrap_or_else(|| title_from_path(&entry.path)),
            number: meta.track_number,
            disk: meta.disk_number,
            artist_id: performer_id,
            album_id: album.id,
            genre_id,
            file_id,
            length: meta.length,
            bitrate: meta.bitrate,
            mimetype: Some(entry.mimetype.clone()),
            scan_mtime: Some(entry.mtime),
            starred: None,
        };
        self.store.tracks().insert_or_update(&mut track)?;
        Ok(())
    }
}
