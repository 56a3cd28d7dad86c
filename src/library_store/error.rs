//! Error taxonomy for the library store.
//!
//! Unique-constraint violations get their own variant so that
//! `insert_or_update` can recover from them explicitly; anywhere else they
//! surface as a fatal error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A lookup that was expected to match exactly one row matched none.
    #[error("no {entity} row matches {key}")]
    NotFound { entity: &'static str, key: String },

    /// A lookup that was expected to match at most one row matched several.
    /// Never recovered: it means an identity constraint has been bypassed.
    #[error("{count} {entity} rows match {key}, expected at most one")]
    Ambiguous {
        entity: &'static str,
        key: String,
        count: usize,
    },

    /// The store rejected a write because a natural-key unique index matched
    /// an existing row. Recovered only inside `insert_or_update`.
    #[error("unique constraint violated: {0}")]
    UniqueConstraint(#[source] rusqlite::Error),

    /// Any other store failure (connection loss, busy timeout, bad SQL).
    /// Not retried here; the caller owns retry policy.
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            StoreError::UniqueConstraint(err)
        } else {
            StoreError::Sqlite(err)
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}
