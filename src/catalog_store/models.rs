//! Data models for collection queries.

use serde::Serialize;

/// An album row with its artist name resolved.
///
/// At least one of `folder_path` or (`name` and `artist_name`) must carry
/// usable values for delivery to resolve a source directory.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumRecord {
    pub id: i64,
    pub name: String,
    pub artist_name: String,
    /// Absolute path, or a path relative to the music library root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Compact album row for listings.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumSummary {
    pub id: i64,
    pub name: String,
    pub artist_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtistRecord {
    pub id: i64,
    pub name: String,
    pub album_count: i64,
}
