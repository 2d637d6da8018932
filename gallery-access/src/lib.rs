//! # Gallery Access
//!
//! Gallery access layer for an embeddable image picker.
//!
//! This crate provides the parts of the picker that do not depend on a UI toolkit:
//! - A one-shot media index grouping device images into buckets (albums)
//! - A thumbnail cache bounded by a byte budget
//! - Deduplicated background thumbnail fetches with weakly held receivers
//! - The picker selection state machine and a headless picker session
//!
//! ## Threading
//!
//! Blocking work runs on tokio's blocking pool. Every callback a host sees is
//! delivered through the [`MainQueue`], which the host drains from its UI thread.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use gallery_access::{GalleryAccess, GalleryConfig, PickerConfig, PickerSession};
//!
//! let (gallery, mut main) = GalleryAccess::start(GalleryConfig::default(), store, handle);
//! let mut session = PickerSession::launch(gallery.clone(), PickerConfig::multi(true, 5));
//!
//! // on the UI thread
//! main.run_pending();
//! ```

pub mod cache;
pub mod fetch;
pub mod index;
pub mod models;
pub mod picker;
pub mod service;
pub mod store;
pub mod tasks;
pub mod thumbnail;

pub use cache::BitmapCache;
pub use fetch::{ThumbnailFetcher, ThumbnailReceiver};
pub use index::{Bucket, MediaIndex};
pub use models::{GalleryConfig, ImageId, ImageRecord};
pub use picker::{
    BucketFilter, PickerConfig, PickerResult, PickerSession, Selection, SelectionEvent,
    SelectionMode, SelectionOutcome,
};
pub use service::{GalleryAccess, GalleryError, IndexReadyListener, IndexStatus};
pub use store::{ImageStore, StoreError};
pub use tasks::{BackgroundOutcome, MainQueue, TaskManager};
pub use thumbnail::{decode_thumbnail, Thumbnail, ThumbnailError};
