//! Empty collection store for tests and scheduler wiring.

use anyhow::Result;

use super::models::{AlbumRecord, AlbumSummary, ArtistRecord};
use super::CatalogStore;

/// A store with no content. Every lookup misses.
pub struct NullCatalogStore;

impl CatalogStore for NullCatalogStore {
    fn get_album(&self, _id: i64) -> Result<Option<AlbumRecord>> {
        Ok(None)
    }

    fn list_albums(&self, _limit: usize, _offset: usize) -> Result<Vec<AlbumSummary>> {
        Ok(Vec::new())
    }

    fn get_artist(&self, _id: i64) -> Result<Option<ArtistRecord>> {
        Ok(None)
    }

    fn list_artist_albums(&self, _artist_id: i64) -> Result<Vec<AlbumSummary>> {
        Ok(Vec::new())
    }

    fn artist_count(&self) -> usize {
        0
    }

    fn album_count(&self) -> usize {
        0
    }

    fn song_count(&self) -> usize {
        0
    }
}
