mod error;
mod kinds;
mod mapper;
mod models;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use mapper::{Entity, EntityKind, Mapper};
pub use models::{
    Album, Artist, Bookmark, FileRecord, Genre, Playlist, SortMode, Track,
};
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use store::LibraryStore;
