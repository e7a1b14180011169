//! SQLite-backed collection store.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use super::models::{AlbumRecord, AlbumSummary, ArtistRecord};
use super::CatalogStore;

pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    /// Open the collection database read-only.
    ///
    /// The schema is owned by the collection scanner; this store never
    /// writes, which `query_only` enforces on top of the open flags.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open collection database at {:?}", path))?;
        conn.pragma_update(None, "query_only", "ON")?;

        info!("Opened collection database at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn count(&self, table: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn get_album(&self, id: i64) -> Result<Option<AlbumRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT al.id, al.name, ar.name, al.folder_path, al.year, al.genre, al.label
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             WHERE al.id = ?1",
            params![id],
            |row| {
                Ok(AlbumRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artist_name: row.get(2)?,
                    folder_path: row.get(3)?,
                    year: row.get(4)?,
                    genre: row.get(5)?,
                    label: row.get(6)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query album {}", id))
    }

    fn list_albums(&self, limit: usize, offset: usize) -> Result<Vec<AlbumSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT al.id, al.name, ar.name, al.year
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             ORDER BY ar.name, al.name LIMIT ?1 OFFSET ?2",
        )?;
        let albums = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(AlbumSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artist_name: row.get(2)?,
                    year: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list albums")?;
        Ok(albums)
    }

    fn get_artist(&self, id: i64) -> Result<Option<ArtistRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT ar.id, ar.name, COUNT(al.id)
             FROM artists ar LEFT JOIN albums al ON al.artist_id = ar.id
             WHERE ar.id = ?1 GROUP BY ar.id",
            params![id],
            |row| {
                Ok(ArtistRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    album_count: row.get(2)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query artist {}", id))
    }

    fn list_artist_albums(&self, artist_id: i64) -> Result<Vec<AlbumSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT al.id, al.name, ar.name, al.year
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             WHERE al.artist_id = ?1 ORDER BY al.year, al.name",
        )?;
        let albums = stmt
            .query_map(params![artist_id], |row| {
                Ok(AlbumSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artist_name: row.get(2)?,
                    year: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to list albums for artist {}", artist_id))?;
        Ok(albums)
    }

    fn artist_count(&self) -> usize {
        self.count("artists")
    }

    fn album_count(&self) -> usize {
        self.count("albums")
    }

    fn song_count(&self) -> usize {
        self.count("songs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("collection.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE artists (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE albums (
                 id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 artist_id INTEGER NOT NULL REFERENCES artists(id),
                 folder_path TEXT,
                 year INTEGER,
                 genre TEXT,
                 label TEXT
             );
             CREATE TABLE songs (
                 id INTEGER PRIMARY KEY,
                 album_id INTEGER NOT NULL REFERENCES albums(id),
                 title TEXT NOT NULL,
                 track_number INTEGER
             );
             INSERT INTO artists (id, name) VALUES (1, 'Silver Birch');
             INSERT INTO albums (id, name, artist_id, folder_path, year)
                 VALUES (42, 'Harvest Moon', 1, '/music/Silver Birch/Harvest Moon', 1992);
             INSERT INTO albums (id, name, artist_id, folder_path, year)
                 VALUES (43, 'First Frost', 1, NULL, 1994);
             INSERT INTO songs (id, album_id, title, track_number) VALUES (1, 42, 'Dawn', 1);
             INSERT INTO songs (id, album_id, title, track_number) VALUES (2, 42, 'Dusk', 2);",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_get_album_resolves_artist_name() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(create_test_db(&dir)).unwrap();

        let album = store.get_album(42).unwrap().unwrap();
        assert_eq!(album.name, "Harvest Moon");
        assert_eq!(album.artist_name, "Silver Birch");
        assert_eq!(
            album.folder_path.as_deref(),
            Some("/music/Silver Birch/Harvest Moon")
        );
        assert_eq!(album.year, Some(1992));

        let missing = store.get_album(999).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_album_without_folder_path() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(create_test_db(&dir)).unwrap();

        let album = store.get_album(43).unwrap().unwrap();
        assert!(album.folder_path.is_none());
    }

    #[test]
    fn test_counts_and_listings() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(create_test_db(&dir)).unwrap();

        assert_eq!(store.artist_count(), 1);
        assert_eq!(store.album_count(), 2);
        assert_eq!(store.song_count(), 2);

        let albums = store.list_albums(10, 0).unwrap();
        assert_eq!(albums.len(), 2);
        // Ordered by artist then album name
        assert_eq!(albums[0].name, "First Frost");

        let artist = store.get_artist(1).unwrap().unwrap();
        assert_eq!(artist.album_count, 2);
        assert_eq!(store.list_artist_albums(1).unwrap().len(), 2);
    }
}
