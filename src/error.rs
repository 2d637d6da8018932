use gallery_access::GalleryError;
use std::fmt;

/// Central error types for the image picker host
#[derive(Debug)]
pub enum AppError {
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Configuration file could not be parsed
    Config(String),
    /// Invalid command line usage
    Usage(String),
    /// Gallery access error (e.g. index failed to build)
    Gallery(GalleryError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Usage(msg) => write!(f, "{}", msg),
            AppError::Gallery(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<GalleryError> for AppError {
    fn from(e: GalleryError) -> Self {
        AppError::Gallery(e)
    }
}

/// Short messages for the terminal front end
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Filesystem(_) => {
                "Error accessing files. Please check the photo directory permissions.".to_string()
            }
            AppError::Config(msg) => format!("Invalid configuration: {}", msg),
            AppError::Usage(msg) => msg.clone(),
            AppError::Gallery(GalleryError::IndexFailed(_)) => {
                "The photo library could not be read.".to_string()
            }
            AppError::Gallery(GalleryError::NotPrepared) => {
                "The photo library is still loading.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_index_reads_as_unreadable_library() {
        let err: AppError = GalleryError::IndexFailed("index build panicked".to_string()).into();
        assert!(matches!(err, AppError::Gallery(GalleryError::IndexFailed(_))));
        assert_eq!(err.user_message(), "The photo library could not be read.");
        assert_eq!(
            err.to_string(),
            "Media index failed to build: index build panicked"
        );
    }

    #[test]
    fn test_missing_file_maps_to_filesystem_error() {
        let err: AppError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, AppError::Filesystem(_)));
    }
}
