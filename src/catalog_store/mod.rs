//! Read-only access to the music collection database.
//!
//! The collection is produced and maintained by an external scanner; this
//! server only ever queries it. The `CatalogStore` trait keeps the rest of
//! the code independent of the SQLite backing so tests can substitute a
//! null store.

mod models;
mod null_store;
mod store;

pub use models::{AlbumRecord, AlbumSummary, ArtistRecord};
pub use null_store::NullCatalogStore;
pub use store::SqliteCatalogStore;

use anyhow::Result;

/// Trait for music collection lookups.
///
/// All methods are pure queries and must be safe to call from worker
/// threads. Transient I/O errors propagate to the caller.
pub trait CatalogStore: Send + Sync {
    /// Get an album (with its artist name resolved) by ID.
    fn get_album(&self, id: i64) -> Result<Option<AlbumRecord>>;

    /// List albums ordered by artist then name, paginated.
    fn list_albums(&self, limit: usize, offset: usize) -> Result<Vec<AlbumSummary>>;

    /// Get an artist by ID.
    fn get_artist(&self, id: i64) -> Result<Option<ArtistRecord>>;

    /// List an artist's albums ordered by year then name.
    fn list_artist_albums(&self, artist_id: i64) -> Result<Vec<AlbumSummary>>;

    /// Number of artists in the collection (for startup metrics).
    fn artist_count(&self) -> usize;

    /// Number of albums in the collection (for startup metrics).
    fn album_count(&self) -> usize;

    /// Number of songs in the collection (for startup metrics).
    fn song_count(&self) -> usize;
}
