//! End-to-end tests for the library engine.
//!
//! Drives the public API the way the CLI does: scans from metadata
//! manifests, sweeps, resolves covers, and checks the integrity invariants
//! that must hold afterwards.

mod common;

use common::{audio_entry, image_entry, manifest, TestLibrary};

use melodeon::library_store::{Album, Artist, SortMode, Track};
use melodeon::maintenance::run_sweep;
use melodeon::scan::{ScanOptions, Scanner};

// =============================================================================
// Upsert semantics
// =============================================================================

#[test]
fn test_upsert_same_identity_twice_yields_one_row() {
    let lib = TestLibrary::create();

    let mut first = Artist {
        user_id: "alice".to_string(),
        name: Some("Charles Mingus".to_string()),
        ..Default::default()
    };
    lib.store.artists().insert_or_update(&mut first).unwrap();

    let mut second = Artist {
        user_id: "alice".to_string(),
        name: Some("Charles Mingus".to_string()),
        ..Default::default()
    };
    lib.store.artists().insert_or_update(&mut second).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(lib.store.artists().count("alice").unwrap(), 1);
}

#[test]
fn test_album_null_identities_are_distinct_rows() {
    let lib = TestLibrary::create();

    let mut all_null = Album {
        user_id: "alice".to_string(),
        name: None,
        year: None,
        ..Default::default()
    };
    let mut with_year = Album {
        user_id: "alice".to_string(),
        name: None,
        year: Some(2020),
        ..Default::default()
    };
    lib.store.albums().insert_or_update(&mut all_null).unwrap();
    lib.store.albums().insert_or_update(&mut with_year).unwrap();

    assert_ne!(all_null.id, with_year.id);
    assert_eq!(lib.store.albums().count("alice").unwrap(), 2);
}

#[test]
fn test_find_all_by_name_null_returns_only_null_named_rows() {
    let lib = TestLibrary::create();

    for name in [Some("Ornithology"), None, Some("Koko")] {
        lib.store
            .albums()
            .insert_or_update(&mut Album {
                user_id: "alice".to_string(),
                name: name.map(|n| n.to_string()),
                ..Default::default()
            })
            .unwrap();
    }

    let found = lib
        .store
        .albums()
        .find_all_by_name(None, "alice", false, None, None)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, None);
}

#[test]
fn test_concurrent_upserts_converge_on_one_row() {
    let lib = TestLibrary::create();
    let n = 8;

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let store = lib.store.clone();
            std::thread::spawn(move || {
                let mut artist = Artist {
                    user_id: "alice".to_string(),
                    name: Some("Thelonious Monk".to_string()),
                    cover_file_id: Some(i),
                    ..Default::default()
                };
                store.artists().insert_or_update(&mut artist).map(|_| artist.id)
            })
        })
        .collect();

    let ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().expect("upsert must not error"))
        .collect();

    // All calls succeeded and agree on the surviving row
    assert_eq!(ids.len(), n as usize);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(lib.store.artists().count("alice").unwrap(), 1);
}

// =============================================================================
// Maintenance sweep
// =============================================================================

/// Checks the integrity invariants the sweep must establish: every track
/// references existing same-user rows, every album has a track, every
/// artist is referenced as album artist or performer.
fn assert_library_consistent(lib: &TestLibrary, user: &str) {
    let tracks = lib.store.tracks().find_all(user, SortMode::None, None, None).unwrap();
    let albums = lib.store.albums().find_all(user, SortMode::None, None, None).unwrap();
    let artists = lib.store.artists().find_all(user, SortMode::None, None, None).unwrap();

    let album_ids: Vec<i64> = albums.iter().filter_map(|a| a.id).collect();
    let artist_ids: Vec<i64> = artists.iter().filter_map(|a| a.id).collect();

    for track in &tracks {
        if let Some(album_id) = track.album_id {
            assert!(album_ids.contains(&album_id), "track references missing album");
        }
        if let Some(artist_id) = track.artist_id {
            assert!(artist_ids.contains(&artist_id), "track references missing artist");
        }
    }
    for album in &albums {
        assert!(
            tracks.iter().any(|t| t.album_id == album.id),
            "album without tracks survived"
        );
    }
    for artist in &artists {
        let referenced = albums.iter().any(|a| a.album_artist_id == artist.id)
            || tracks.iter().any(|t| t.artist_id == artist.id);
        assert!(referenced, "unreferenced artist survived");
    }
}

#[test]
fn test_sweep_restores_integrity_after_file_loss() {
    let lib = TestLibrary::create();
    let scanner = Scanner::new(&lib.store);

    scanner
        .run(
            &manifest(
                "alice",
                vec![
                    audio_entry("Music/KindOfBlue/01.mp3", "So What", "Miles Davis", "Kind of Blue"),
                    audio_entry("Music/MingusAhUm/01.mp3", "Better Git It", "Charles Mingus", "Mingus Ah Um"),
                ],
            ),
            &ScanOptions::default(),
        )
        .unwrap();

    // Mingus Ah Um disappears from disk
    scanner
        .run(
            &manifest(
                "alice",
                vec![audio_entry(
                    "Music/KindOfBlue/01.mp3",
                    "So What",
                    "Miles Davis",
                    "Kind of Blue",
                )],
            ),
            &ScanOptions {
                clean_obsolete: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_library_consistent(&lib, "alice");
    assert_eq!(lib.store.tracks().count("alice").unwrap(), 1);
    assert_eq!(lib.store.albums().count("alice").unwrap(), 1);
    assert_eq!(lib.store.artists().count("alice").unwrap(), 1);

    let remaining = lib
        .store
        .artists()
        .find_all("alice", SortMode::Name, None, None)
        .unwrap();
    assert_eq!(remaining[0].name.as_deref(), Some("Miles Davis"));
}

#[test]
fn test_sweep_twice_removes_nothing_the_second_time() {
    let lib = TestLibrary::create();
    let scanner = Scanner::new(&lib.store);

    scanner
        .run(
            &manifest(
                "alice",
                vec![audio_entry("Music/a/1.mp3", "One", "A", "First")],
            ),
            &ScanOptions::default(),
        )
        .unwrap();

    // Orphan the track by dropping its file from the mirror
    let file = lib.store.file_by_path("alice", "Music/a/1.mp3").unwrap().unwrap();
    lib.store.delete_files(&[file.id.unwrap()]).unwrap();

    let first = run_sweep(&lib.store).unwrap();
    assert!(first.total() > 0);

    let second = run_sweep(&lib.store).unwrap();
    assert_eq!(second.total(), 0);
}

#[test]
fn test_obsolete_track_cascade_removes_album_and_artist() {
    let lib = TestLibrary::create();
    let scanner = Scanner::new(&lib.store);

    // Insert T1(album=A1, artist=R1)
    scanner
        .run(
            &manifest(
                "alice",
                vec![audio_entry("Music/a/t1.mp3", "T1", "R1", "A1")],
            ),
            &ScanOptions::default(),
        )
        .unwrap();
    assert_eq!(lib.store.tracks().count("alice").unwrap(), 1);

    // The backing file disappears; the classifier marks T1 obsolete and the
    // clean pass deletes it, then the sweep prunes A1 and R1
    let report = scanner
        .run(
            &manifest("alice", vec![]),
            &ScanOptions {
                clean_obsolete: true,
                ..Default::default()
            },
        )
        .unwrap();

    let removed = report.removed.unwrap();
    assert_eq!(removed.albums, 1);
    assert_eq!(removed.artists, 1);
    assert_eq!(lib.store.tracks().count("alice").unwrap(), 0);
    assert_eq!(lib.store.albums().count("alice").unwrap(), 0);
    assert_eq!(lib.store.artists().count("alice").unwrap(), 0);
}

// =============================================================================
// Cover art resolution
// =============================================================================

#[test]
fn test_cover_resolution_is_deterministic_under_permutation() {
    let image_names = [
        "1123213.jpg",
        "coverasd.jpg",
        "albumart.jpg",
        "folder.jpg",
        "front.jpg",
    ];

    // Whatever order the images arrive in (and whatever file ids they get),
    // the "cover" prefix wins
    for rotation in 0..image_names.len() {
        let lib = TestLibrary::create();
        let mut names: Vec<&str> = image_names.to_vec();
        names.rotate_left(rotation);

        let mut files = vec![audio_entry("Music/a/1.mp3", "One", "A", "First")];
        for name in &names {
            files.push(image_entry(&format!("Music/a/{}", name)));
        }

        Scanner::new(&lib.store)
            .run(&manifest("alice", files), &ScanOptions::default())
            .unwrap();

        let albums = lib
            .store
            .albums()
            .find_all("alice", SortMode::None, None, None)
            .unwrap();
        let expected = lib
            .store
            .file_by_path("alice", "Music/a/coverasd.jpg")
            .unwrap()
            .unwrap();
        assert_eq!(albums[0].cover_file_id, expected.id);
    }
}

#[test]
fn test_cover_tie_break_takes_first_candidate() {
    let lib = TestLibrary::create();

    // Neither image matches a preferred prefix; the first found (lowest
    // file id) is chosen
    Scanner::new(&lib.store)
        .run(
            &manifest(
                "alice",
                vec![
                    audio_entry("Music/a/1.mp3", "One", "A", "First"),
                    image_entry("Music/a/zzz.jpg"),
                    image_entry("Music/a/aaa.jpg"),
                ],
            ),
            &ScanOptions::default(),
        )
        .unwrap();

    let albums = lib
        .store
        .albums()
        .find_all("alice", SortMode::None, None, None)
        .unwrap();
    let expected = lib
        .store
        .file_by_path("alice", "Music/a/zzz.jpg")
        .unwrap()
        .unwrap();
    assert_eq!(albums[0].cover_file_id, expected.id);
}

#[test]
fn test_skip_art_leaves_covers_unresolved() {
    let lib = TestLibrary::create();

    let report = Scanner::new(&lib.store)
        .run(
            &manifest(
                "alice",
                vec![
                    audio_entry("Music/a/1.mp3", "One", "A", "First"),
                    image_entry("Music/a/cover.jpg"),
                ],
            ),
            &ScanOptions {
                skip_art: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(report.covers_resolved, 0);
    let albums = lib
        .store
        .albums()
        .find_all("alice", SortMode::None, None, None)
        .unwrap();
    assert_eq!(albums[0].cover_file_id, None);
}

// =============================================================================
// Multi-user isolation
// =============================================================================

#[test]
fn test_scans_of_different_users_stay_isolated() {
    let lib = TestLibrary::create();
    let scanner = Scanner::new(&lib.store);

    scanner
        .run(
            &manifest(
                "alice",
                vec![audio_entry("Music/a/1.mp3", "One", "Shared Name", "Shared Album")],
            ),
            &ScanOptions::default(),
        )
        .unwrap();
    scanner
        .run(
            &manifest(
                "bob",
                vec![audio_entry("Music/a/1.mp3", "One", "Shared Name", "Shared Album")],
            ),
            &ScanOptions::default(),
        )
        .unwrap();

    // Same names, same paths, distinct rows per user
    assert_eq!(lib.store.artists().count("alice").unwrap(), 1);
    assert_eq!(lib.store.artists().count("bob").unwrap(), 1);

    let alice = lib.store.artists().find_all("alice", SortMode::None, None, None).unwrap();
    let bob = lib.store.artists().find_all("bob", SortMode::None, None, None).unwrap();
    assert_ne!(alice[0].id, bob[0].id);

    // Wiping bob leaves alice intact
    melodeon::maintenance::reset_library(
        &lib.store,
        melodeon::maintenance::ResetScope::Users(&["bob".to_string()]),
    )
    .unwrap();
    assert_eq!(lib.store.tracks().count("alice").unwrap(), 1);
    assert_eq!(lib.store.tracks().count("bob").unwrap(), 0);
}

// =============================================================================
// Track lookups survive the whole flow
// =============================================================================

#[test]
fn test_rescan_keeps_track_ids_stable() {
    let lib = TestLibrary::create();
    let scanner = Scanner::new(&lib.store);
    let m = manifest(
        "alice",
        vec![audio_entry("Music/a/1.mp3", "One", "A", "First")],
    );

    scanner.run(&m, &ScanOptions::default()).unwrap();
    let before: Vec<Track> = lib
        .store
        .tracks()
        .find_all("alice", SortMode::None, None, None)
        .unwrap();

    scanner
        .run(
            &m,
            &ScanOptions {
                rescan: true,
                ..Default::default()
            },
        )
        .unwrap();
    let after: Vec<Track> = lib
        .store
        .tracks()
        .find_all("alice", SortMode::None, None, None)
        .unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(before[0].id, after[0].id);
}
