//! Test data builders: a small SQLite collection plus matching audio
//! directories on disk.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use super::constants::*;

/// Create a temporary collection database and the music directories its
/// folder paths point at.
///
/// Layout:
/// - Album 1 "Meadow Songs": 01.mp3, 02.mp3 and a cover.jpg
/// - Album 2 "Sketches": cover.jpg only (no audio)
/// - Album 3 "Shadows": Disc 1/01.flac, Disc 2/01.flac, folder path
///   recorded as ".../Shadows/Disc 2"
pub fn create_test_catalog() -> Result<(TempDir, PathBuf, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let music_root = temp_dir.path().join("music");

    let meadow_dir = music_root.join(ARTIST_LARKS_NAME).join(ALBUM_MEADOW_NAME);
    fs::create_dir_all(&meadow_dir)?;
    fs::write(meadow_dir.join("01.mp3"), b"meadow songs track one audio")?;
    fs::write(meadow_dir.join("02.mp3"), b"meadow songs track two audio")?;
    fs::write(meadow_dir.join("cover.jpg"), b"front cover artwork")?;

    let sketches_dir = music_root.join("Paper Cranes").join("Sketches");
    fs::create_dir_all(&sketches_dir)?;
    fs::write(sketches_dir.join("cover.jpg"), b"artwork but no audio")?;

    let shadows_dir = music_root.join(ARTIST_LARKS_NAME).join(ALBUM_MULTI_DISC_NAME);
    for disc in ["Disc 1", "Disc 2"] {
        let disc_dir = shadows_dir.join(disc);
        fs::create_dir_all(&disc_dir)?;
        fs::write(disc_dir.join("01.flac"), format!("{} audio", disc))?;
    }

    let db_path = temp_dir.path().join("collection.db");
    let conn = Connection::open(&db_path)?;
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
         );",
    )?;

    conn.execute(
        "INSERT INTO artists (id, name) VALUES (?1, ?2), (2, 'Paper Cranes')",
        params![ARTIST_LARKS_ID, ARTIST_LARKS_NAME],
    )?;
    conn.execute(
        "INSERT INTO albums (id, name, artist_id, folder_path, year) VALUES (?1, ?2, ?3, ?4, 2018)",
        params![
            ALBUM_MEADOW_ID,
            ALBUM_MEADOW_NAME,
            ARTIST_LARKS_ID,
            meadow_dir.to_string_lossy()
        ],
    )?;
    conn.execute(
        "INSERT INTO albums (id, name, artist_id, folder_path, year) VALUES (?1, 'Sketches', 2, ?2, 2020)",
        params![ALBUM_ARTWORK_ONLY_ID, sketches_dir.to_string_lossy()],
    )?;
    conn.execute(
        "INSERT INTO albums (id, name, artist_id, folder_path, year) VALUES (?1, ?2, ?3, ?4, 2021)",
        params![
            ALBUM_MULTI_DISC_ID,
            ALBUM_MULTI_DISC_NAME,
            ARTIST_LARKS_ID,
            shadows_dir.join("Disc 2").to_string_lossy()
        ],
    )?;
    conn.execute_batch(
        "INSERT INTO songs (album_id, title, track_number) VALUES (1, 'Dawn Chorus', 1);
         INSERT INTO songs (album_id, title, track_number) VALUES (1, 'Hedgerow', 2);
         INSERT INTO songs (album_id, title, track_number) VALUES (3, 'Umbra', 1);",
    )?;

    Ok((temp_dir, db_path, music_root))
}
