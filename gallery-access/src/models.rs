use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Base URI for image references handed back to the host
pub const IMAGE_CONTENT_URI: &str = "content://media/external/images/media";

/// Stable identity of one image across index, cache and fetch layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub i64);

impl ImageId {
    /// Content URI for this image (e.g. `content://media/external/images/media/42`)
    pub fn uri(&self) -> String {
        format!("{}/{}", IMAGE_CONTENT_URI, self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// One image as reported by the backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub display_name: String,
    /// Album/folder the image belongs to, if the store knows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<DateTime<Utc>>,
}

impl ImageRecord {
    pub fn new(id: i64, display_name: impl Into<String>, bucket: Option<&str>) -> Self {
        Self {
            id: ImageId(id),
            display_name: display_name.into(),
            bucket: bucket.map(str::to_string),
            date_modified: None,
        }
    }
}

/// Configuration for the gallery access layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Byte budget of the in-memory thumbnail cache
    pub cache_capacity_bytes: usize,
    /// Width of the display the picker grid is shown on
    pub display_width: u32,
    /// Thumbnails are `display_width / thumbnail_divisor` pixels square
    pub thumbnail_divisor: u32,
    /// Number of concurrent background jobs
    pub workers: usize,
    /// Upper bound for a single thumbnail fetch, 0 disables the limit
    pub fetch_timeout_secs: u64,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 2 * 1024 * 1024,
            display_width: 1080,
            thumbnail_divisor: 3,
            workers: 4,
            fetch_timeout_secs: 30,
        }
    }
}

impl GalleryConfig {
    /// Edge length of the square thumbnails requested from the store
    pub fn thumbnail_size(&self) -> u32 {
        (self.display_width / self.thumbnail_divisor.max(1)).max(1)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        match self.fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_uri() {
        assert_eq!(
            ImageId(42).uri(),
            "content://media/external/images/media/42"
        );
        assert_eq!(ImageId(7).to_string(), ImageId(7).uri());
    }

    #[test]
    fn test_thumbnail_size_is_a_third_of_the_display() {
        let config = GalleryConfig {
            display_width: 1080,
            ..Default::default()
        };
        assert_eq!(config.thumbnail_size(), 360);

        let degenerate = GalleryConfig {
            display_width: 2,
            thumbnail_divisor: 0,
            ..Default::default()
        };
        assert_eq!(degenerate.thumbnail_size(), 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: GalleryConfig =
            serde_json::from_str(r#"{"cache_capacity_bytes": 1024, "fetch_timeout_secs": 0}"#)
                .unwrap();
        assert_eq!(config.cache_capacity_bytes, 1024);
        assert_eq!(config.workers, 4);
        assert_eq!(config.fetch_timeout(), None);
    }
}
