use crate::models::ImageId;
use image::{imageops::FilterType, DynamicImage, RgbaImage};
use std::path::Path;
use std::time::Duration;

/// Error type for thumbnail operations
#[derive(Debug)]
pub enum ThumbnailError {
    ImageLoadError(String),
    NotFound(ImageId),
    IoError(std::io::Error),
    Timeout(Duration),
}

impl std::fmt::Display for ThumbnailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailError::ImageLoadError(msg) => write!(f, "Image load error: {}", msg),
            ThumbnailError::NotFound(id) => write!(f, "No image data for {}", id),
            ThumbnailError::IoError(e) => write!(f, "IO error: {}", e),
            ThumbnailError::Timeout(d) => write!(f, "Thumbnail fetch timed out after {:?}", d),
        }
    }
}

impl std::error::Error for ThumbnailError {}

impl From<std::io::Error> for ThumbnailError {
    fn from(err: std::io::Error) -> Self {
        ThumbnailError::IoError(err)
    }
}

/// A decoded thumbnail, kept as raw RGBA pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pixels: RgbaImage,
}

impl Thumbnail {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Solid placeholder of the given size, mostly useful for fake stores
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Memory cost charged against the cache budget (4 bytes per pixel)
    pub fn byte_cost(&self) -> usize {
        self.width() as usize * self.height() as usize * 4
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl From<DynamicImage> for Thumbnail {
    fn from(img: DynamicImage) -> Self {
        Self::new(img.into_rgba8())
    }
}

/// Scales an image down so it fits a `size`×`size` square, keeping aspect ratio.
/// Images already small enough are kept as they are.
pub fn fit_thumbnail(img: DynamicImage, size: u32) -> Thumbnail {
    if img.width() <= size && img.height() <= size {
        return img.into();
    }
    img.resize(size, size, FilterType::Lanczos3).into()
}

/// Decodes the image file at `path` into a thumbnail of at most `size` pixels per side
pub fn decode_thumbnail(path: &Path, size: u32) -> Result<Thumbnail, ThumbnailError> {
    log::debug!("Decoding thumbnail for {:?} at {}px", path, size);

    if !path.exists() {
        return Err(ThumbnailError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    let data = std::fs::read(path)?;
    decode_thumbnail_bytes(&data, size)
}

/// Format is sniffed from the content, not from the file extension
fn decode_thumbnail_bytes(data: &[u8], size: u32) -> Result<Thumbnail, ThumbnailError> {
    let img = image::load_from_memory(data)
        .map_err(|e| ThumbnailError::ImageLoadError(format!("Failed to decode image: {}", e)))?;
    Ok(fit_thumbnail(img, size))
}
