//! Common test infrastructure
//!
//! Provides a tempdir-backed library store plus manifest fixture builders
//! for the end-to-end tests. Tests should only import from this module.

use melodeon::library_store::LibraryStore;
use melodeon::scan::{FileMetadata, ManifestFile, ScanManifest};
use tempfile::TempDir;

pub struct TestLibrary {
    pub store: LibraryStore,
    _temp_dir: TempDir, // Keep temp dir alive
}

impl TestLibrary {
    pub fn create() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("library.db");
        let store = LibraryStore::new(&db_path).unwrap();
        TestLibrary {
            store,
            _temp_dir: temp_dir,
        }
    }
}

pub fn manifest(user: &str, files: Vec<ManifestFile>) -> ScanManifest {
    ScanManifest {
        user: user.to_string(),
        files,
    }
}

pub fn audio_entry(path: &str, title: &str, artist: &str, album: &str) -> ManifestFile {
    ManifestFile {
        path: path.to_string(),
        mtime: 100,
        mimetype: "audio/mpeg".to_string(),
        metadata: Some(FileMetadata {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            album_artist: None,
            album: Some(album.to_string()),
            year: Some(1959),
            track_number: Some(1),
            disk_number: Some(1),
            length: Some(300),
            bitrate: Some(320),
            genre: Some("Jazz".to_string()),
        }),
    }
}

pub fn image_entry(path: &str) -> ManifestFile {
    ManifestFile {
        path: path.to_string(),
        mtime: 100,
        mimetype: "image/jpeg".to_string(),
        metadata: None,
    }
}
