//! Narrow interface to the device image store.
//!
//! The gallery layer never talks to a platform media database directly. Hosts
//! hand in an [`ImageStore`] implementation (a MediaStore bridge on Android, a
//! directory walker on desktop, an in-memory fake in tests).

use crate::models::{ImageId, ImageRecord};
use crate::thumbnail::{Thumbnail, ThumbnailError};

/// Error returned when the store cannot be enumerated at all
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    IoError(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Image store unavailable: {}", msg),
            StoreError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err)
    }
}

/// Backing store of device images.
///
/// Both calls may block; the gallery layer only invokes them from worker threads.
pub trait ImageStore: Send + Sync {
    /// All images, sorted by modification time, newest first
    fn query_images(&self) -> Result<Vec<ImageRecord>, StoreError>;

    /// Decode a thumbnail for `id` that fits in a `size`×`size` square
    fn load_thumbnail(&self, id: ImageId, size: u32) -> Result<Thumbnail, ThumbnailError>;
}
