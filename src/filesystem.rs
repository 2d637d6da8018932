//! Directory-backed image store.
//!
//! Stands in for the platform media database on desktop: every image file
//! below a root directory is an image, its parent directory is its bucket.

use chrono::{DateTime, Utc};
use gallery_access::{
    decode_thumbnail, ImageId, ImageRecord, ImageStore, StoreError, Thumbnail, ThumbnailError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

struct Found {
    path: PathBuf,
    modified: SystemTime,
}

/// Image store over a directory tree
pub struct DirectoryStore {
    root: PathBuf,
    paths: RwLock<HashMap<ImageId, PathBuf>>,
}

impl std::fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("root", &self.root)
            .finish()
    }
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths: RwLock::new(HashMap::new()),
        }
    }

    /// File behind an image id handed out by the last query
    pub fn path_of(&self, id: ImageId) -> Option<PathBuf> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

impl ImageStore for DirectoryStore {
    fn query_images(&self) -> Result<Vec<ImageRecord>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        log::debug!("Scanning {:?} for images", self.root);

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_image(entry.path()) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push(Found {
                path: entry.into_path(),
                modified,
            });
        }

        // Newest first; path order keeps equal timestamps deterministic
        found.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));

        let mut paths = HashMap::with_capacity(found.len());
        let records = found
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                let id = ImageId(i as i64 + 1);
                let record = ImageRecord {
                    id,
                    display_name: f
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    bucket: f
                        .path
                        .parent()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().to_string()),
                    date_modified: Some(DateTime::<Utc>::from(f.modified)),
                };
                paths.insert(id, f.path);
                record
            })
            .collect::<Vec<_>>();

        log::info!("Found {} images below {:?}", records.len(), self.root);
        *self.paths.write().unwrap_or_else(PoisonError::into_inner) = paths;

        Ok(records)
    }

    fn load_thumbnail(&self, id: ImageId, size: u32) -> Result<Thumbnail, ThumbnailError> {
        let path = self.path_of(id).ok_or(ThumbnailError::NotFound(id))?;
        decode_thumbnail(&path, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::time::Duration;

    fn write_png(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
            .save(path)
            .unwrap();
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_query_sorts_newest_first_and_buckets_by_folder() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("Camera/old.png");
        let new = dir.path().join("Screenshots/new.png");
        let mid = dir.path().join("Camera/mid.png");
        for p in [&old, &new, &mid] {
            write_png(p, 4, 4);
        }
        set_mtime(&old, 1_000);
        set_mtime(&mid, 2_000);
        set_mtime(&new, 3_000);
        fs::write(dir.path().join("Camera/notes.txt"), "not an image").unwrap();

        let store = DirectoryStore::new(dir.path());
        let records = store.query_images().unwrap();

        let names: Vec<_> = records.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["new.png", "mid.png", "old.png"]);
        assert_eq!(records[0].bucket.as_deref(), Some("Screenshots"));
        assert_eq!(records[1].bucket.as_deref(), Some("Camera"));
        assert_eq!(store.path_of(records[2].id), Some(old));
    }

    #[test]
    fn test_load_thumbnail_fits_target_size() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("Camera/wide.png"), 200, 100);

        let store = DirectoryStore::new(dir.path());
        let records = store.query_images().unwrap();
        let thumb = store.load_thumbnail(records[0].id, 50).unwrap();

        assert_eq!((thumb.width(), thumb.height()), (50, 25));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.query_images().unwrap();
        assert!(matches!(
            store.load_thumbnail(ImageId(99), 50),
            Err(ThumbnailError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let store = DirectoryStore::new("/no/such/photo/library");
        assert!(matches!(
            store.query_images(),
            Err(StoreError::Unavailable(_))
        ));
    }
}
