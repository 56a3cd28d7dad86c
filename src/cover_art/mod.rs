//! Deterministic cover art resolution.
//!
//! Candidate images are ranked by an ordered list of filename prefixes; the
//! ranking is a pure function of the candidate list, so a rescan with the
//! same folder contents always picks the same file.

use tracing::debug;

use crate::library_store::{LibraryStore, StoreResult};

/// Filename prefixes in preference order, matched case-insensitively
/// against the start of the name (not as a substring).
pub const COVER_NAME_PREFERENCE: [&str; 4] = ["cover", "albumart", "front", "folder"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub file_id: i64,
    pub name: String,
}

fn preference_rank(name: &str) -> usize {
    let lowered = name.to_lowercase();
    COVER_NAME_PREFERENCE
        .iter()
        .position(|prefix| lowered.starts_with(prefix))
        .unwrap_or(COVER_NAME_PREFERENCE.len())
}

/// Picks the best candidate: an earlier preference entry always wins; ties
/// (same entry, or both matching none) keep input order; with no preferred
/// name at all, the first candidate is taken.
pub fn pick_cover(candidates: &[CandidateFile]) -> Option<&CandidateFile> {
    // min_by_key returns the first minimum, which is what makes ties stable
    candidates.iter().min_by_key(|c| preference_rank(&c.name))
}

/// Resolves covers for every album of `user_id` that has none yet. Returns
/// the number of albums whose cover was set. Albums with no candidate
/// images get an explicit null write, marking them as searched.
pub fn resolve_covers(store: &LibraryStore, user_id: &str) -> StoreResult<usize> {
    let album_ids = store.album_ids_without_cover(user_id)?;
    let mut resolved = 0;
    for album_id in album_ids {
        let candidates: Vec<CandidateFile> = store
            .cover_candidates(user_id, album_id)?
            .into_iter()
            .map(|f| CandidateFile {
                file_id: f.id.unwrap_or_default(),
                name: f.name,
            })
            .collect();

        match pick_cover(&candidates) {
            Some(best) => {
                debug!(
                    "Resolved cover {} for album {} of {}",
                    best.name, album_id, user_id
                );
                // Applies only while the cover is still null; a concurrent
                // resolver that got there first wins
                if store.update_album_cover_if_unset(album_id, best.file_id)? {
                    resolved += 1;
                }
            }
            None => store.remove_album_cover(album_id)?,
        }
    }
    Ok(resolved)
}
