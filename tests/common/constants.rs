//! Shared IDs and names for the seeded test collection.

pub const ARTIST_LARKS_ID: i64 = 1;
pub const ARTIST_LARKS_NAME: &str = "The Gilded Larks";

pub const ALBUM_MEADOW_ID: i64 = 1;
pub const ALBUM_MEADOW_NAME: &str = "Meadow Songs";

/// Album whose folder holds no audio files, only artwork.
pub const ALBUM_ARTWORK_ONLY_ID: i64 = 2;

/// Album whose recorded folder path ends in "Disc 2".
pub const ALBUM_MULTI_DISC_ID: i64 = 3;
pub const ALBUM_MULTI_DISC_NAME: &str = "Shadows";

pub const UNKNOWN_ALBUM_ID: i64 = 999;
