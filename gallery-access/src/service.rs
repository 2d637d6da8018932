use crate::fetch::{ThumbnailFetcher, ThumbnailReceiver};
use crate::index::MediaIndex;
use crate::models::{GalleryConfig, ImageId};
use crate::store::ImageStore;
use crate::tasks::{BackgroundOutcome, MainQueue, TaskManager};
use crate::thumbnail::Thumbnail;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

/// Error type for gallery access operations
#[derive(Debug, Clone, PartialEq)]
pub enum GalleryError {
    /// The media index is not built yet
    NotPrepared,
    /// Building the media index failed; the gallery is unusable
    IndexFailed(String),
}

impl std::fmt::Display for GalleryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GalleryError::NotPrepared => write!(f, "Media index is not prepared yet"),
            GalleryError::IndexFailed(msg) => write!(f, "Media index failed to build: {}", msg),
        }
    }
}

impl std::error::Error for GalleryError {}

/// Gets notified once the media index is ready, on the completion context
pub trait IndexReadyListener: Send + Sync {
    fn on_index_ready(&self, index: &Arc<MediaIndex>);

    /// Called instead of `on_index_ready` when the build failed. Ignored unless overridden.
    fn on_index_failed(&self, _error: &GalleryError) {}
}

/// Lifecycle of the media index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Unbuilt,
    Building,
    Ready,
    Failed,
}

enum IndexState {
    Unbuilt,
    Building,
    Ready(Arc<MediaIndex>),
    Failed(String),
}

struct IndexSlot {
    state: IndexState,
    listeners: Vec<Arc<dyn IndexReadyListener>>,
}

fn lock(slot: &Mutex<IndexSlot>) -> MutexGuard<'_, IndexSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn same_listener(a: &Arc<dyn IndexReadyListener>, b: &Arc<dyn IndexReadyListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Entry point to the device gallery: one media index and one thumbnail cache.
///
/// The host creates one instance per process and passes it around
/// (typically as `Arc<GalleryAccess>`). To rebuild the index, create a new one.
pub struct GalleryAccess {
    config: GalleryConfig,
    store: Arc<dyn ImageStore>,
    tasks: TaskManager,
    index: Arc<Mutex<IndexSlot>>,
    thumbnails: ThumbnailFetcher,
}

impl std::fmt::Debug for GalleryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryAccess")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl GalleryAccess {
    pub fn new(config: GalleryConfig, store: Arc<dyn ImageStore>, tasks: TaskManager) -> Self {
        let thumbnails = ThumbnailFetcher::new(
            Arc::clone(&store),
            tasks.clone(),
            config.cache_capacity_bytes,
            config.thumbnail_size(),
            config.fetch_timeout(),
        );

        Self {
            config,
            store,
            tasks,
            index: Arc::new(Mutex::new(IndexSlot {
                state: IndexState::Unbuilt,
                listeners: Vec::new(),
            })),
            thumbnails,
        }
    }

    /// Create an instance with its own task manager on `handle`
    pub fn start(
        config: GalleryConfig,
        store: Arc<dyn ImageStore>,
        handle: Handle,
    ) -> (Arc<Self>, MainQueue) {
        let (tasks, main) = TaskManager::new(handle, config.workers);
        (Arc::new(Self::new(config, store, tasks)), main)
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Start building the media index in the background. No-op after the first call.
    pub fn prepare(&self) {
        let mut slot = lock(&self.index);
        if !matches!(slot.state, IndexState::Unbuilt) {
            return;
        }
        slot.state = IndexState::Building;
        drop(slot);

        log::debug!("Preparing media index");

        let store = Arc::clone(&self.store);
        let index = Arc::clone(&self.index);
        let tasks = self.tasks.clone();

        self.tasks.run_background_with_timeout(
            None,
            move || store.query_images().map(MediaIndex::from_records),
            move |outcome| {
                let built = match outcome {
                    BackgroundOutcome::Finished(built) => built.map_err(|e| e.to_string()),
                    BackgroundOutcome::TimedOut(limit) => {
                        Err(format!("index build timed out after {:?}", limit))
                    }
                    BackgroundOutcome::Panicked => Err("index build panicked".to_string()),
                };
                finish_build(&index, &tasks, built);
            },
        );
    }

    pub fn status(&self) -> IndexStatus {
        match lock(&self.index).state {
            IndexState::Unbuilt => IndexStatus::Unbuilt,
            IndexState::Building => IndexStatus::Building,
            IndexState::Ready(_) => IndexStatus::Ready,
            IndexState::Failed(_) => IndexStatus::Failed,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.status() == IndexStatus::Ready
    }

    /// The built media index
    pub fn index(&self) -> Result<Arc<MediaIndex>, GalleryError> {
        match &lock(&self.index).state {
            IndexState::Ready(media) => Ok(Arc::clone(media)),
            IndexState::Failed(msg) => Err(GalleryError::IndexFailed(msg.clone())),
            IndexState::Unbuilt | IndexState::Building => Err(GalleryError::NotPrepared),
        }
    }

    /// Get notified once the index is ready.
    ///
    /// When it already is, the notification is scheduled right away.
    /// Registering the same listener twice keeps a single registration.
    pub fn register_ready_listener<L>(&self, listener: &Arc<L>) -> Result<(), GalleryError>
    where
        L: IndexReadyListener + 'static,
    {
        let listener: Arc<dyn IndexReadyListener> = Arc::clone(listener) as _;
        let mut slot = lock(&self.index);

        let ready = match &slot.state {
            IndexState::Ready(media) => Some(Arc::clone(media)),
            IndexState::Failed(msg) => return Err(GalleryError::IndexFailed(msg.clone())),
            IndexState::Unbuilt | IndexState::Building => None,
        };

        match ready {
            Some(media) => {
                drop(slot);
                self.tasks
                    .run_on_main(move || listener.on_index_ready(&media));
            }
            None => {
                slot.listeners.retain(|l| !same_listener(l, &listener));
                slot.listeners.push(listener);
            }
        }
        Ok(())
    }

    pub fn unregister_ready_listener<L>(&self, listener: &Arc<L>)
    where
        L: IndexReadyListener + 'static,
    {
        let listener: Arc<dyn IndexReadyListener> = Arc::clone(listener) as _;
        lock(&self.index)
            .listeners
            .retain(|l| !same_listener(l, &listener));
    }

    /// Request a thumbnail; see [`ThumbnailFetcher::get_thumbnail`]
    pub fn get_thumbnail<R>(&self, id: ImageId, receiver: &Arc<R>)
    where
        R: ThumbnailReceiver + 'static,
    {
        self.thumbnails.get_thumbnail(id, receiver);
    }

    pub fn cached_thumbnail(&self, id: ImageId) -> Option<Arc<Thumbnail>> {
        self.thumbnails.cached(id)
    }

    pub fn thumbnails(&self) -> &ThumbnailFetcher {
        &self.thumbnails
    }
}

/// Store the build result and schedule the listener callbacks
fn finish_build(
    index: &Arc<Mutex<IndexSlot>>,
    tasks: &TaskManager,
    built: Result<MediaIndex, String>,
) {
    let mut slot = lock(index);

    match built {
        Ok(media) => {
            log::info!(
                "Media index ready: {} images in {} buckets",
                media.image_count(),
                media.bucket_count()
            );
            let media = Arc::new(media);
            slot.state = IndexState::Ready(Arc::clone(&media));
            drop(slot);

            let index = Arc::clone(index);
            tasks.run_on_main(move || notify_prepared(&index, &media));
        }
        Err(msg) => {
            log::error!("Failed to build media index: {}", msg);
            slot.state = IndexState::Failed(msg.clone());
            let listeners = std::mem::take(&mut slot.listeners);
            drop(slot);

            let error = GalleryError::IndexFailed(msg);
            tasks.run_on_main(move || {
                for listener in listeners {
                    listener.on_index_failed(&error);
                }
            });
        }
    }
}

/// Runs on the completion context: deliver the index to every queued listener
fn notify_prepared(index: &Mutex<IndexSlot>, media: &Arc<MediaIndex>) {
    let listeners = std::mem::take(&mut lock(index).listeners);
    for listener in listeners {
        listener.on_index_ready(media);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRecord;
    use crate::store::StoreError;
    use crate::thumbnail::ThumbnailError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeStore {
        records: Option<Vec<ImageRecord>>,
        queries: AtomicUsize,
    }

    impl FakeStore {
        fn with_records(records: Vec<ImageRecord>) -> Arc<Self> {
            Arc::new(Self {
                records: Some(records),
                queries: AtomicUsize::new(0),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                records: None,
                queries: AtomicUsize::new(0),
            })
        }
    }

    impl ImageStore for FakeStore {
        fn query_images(&self) -> Result<Vec<ImageRecord>, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.records
                .clone()
                .ok_or_else(|| StoreError::Unavailable("no media provider".to_string()))
        }

        fn load_thumbnail(&self, _id: ImageId, size: u32) -> Result<Thumbnail, ThumbnailError> {
            Ok(Thumbnail::blank(size, size))
        }
    }

    /// Store whose media provider crashes mid-query
    struct CrashingStore;

    impl ImageStore for CrashingStore {
        fn query_images(&self) -> Result<Vec<ImageRecord>, StoreError> {
            panic!("media provider crashed");
        }

        fn load_thumbnail(&self, id: ImageId, _size: u32) -> Result<Thumbnail, ThumbnailError> {
            Err(ThumbnailError::NotFound(id))
        }
    }

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
        failures: AtomicUsize,
    }

    impl IndexReadyListener for CountingListener {
        fn on_index_ready(&self, _index: &Arc<MediaIndex>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_index_failed(&self, _error: &GalleryError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Appends its name to a shared log when notified
    struct NamedListener {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl IndexReadyListener for NamedListener {
        fn on_index_ready(&self, _index: &Arc<MediaIndex>) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn sample_records() -> Vec<ImageRecord> {
        vec![
            ImageRecord::new(1, "a.jpg", Some("Camera")),
            ImageRecord::new(2, "b.jpg", Some("Screenshots")),
            ImageRecord::new(3, "c.jpg", None),
            ImageRecord::new(4, "d.jpg", Some("Camera")),
        ]
    }

    #[tokio::test]
    async fn test_queries_fail_before_ready() {
        let (access, _main) = GalleryAccess::start(
            GalleryConfig::default(),
            FakeStore::with_records(sample_records()),
            Handle::current(),
        );

        assert_eq!(access.status(), IndexStatus::Unbuilt);
        assert_eq!(access.index().unwrap_err(), GalleryError::NotPrepared);
    }

    #[tokio::test]
    async fn test_listeners_are_notified_once() {
        let store = FakeStore::with_records(sample_records());
        let (access, mut main) =
            GalleryAccess::start(GalleryConfig::default(), store.clone(), Handle::current());
        let listener = Arc::new(CountingListener::default());

        access.register_ready_listener(&listener).unwrap();
        access.register_ready_listener(&listener).unwrap();
        access.prepare();
        access.prepare();

        let ready = main
            .run_until(Duration::from_secs(5), || {
                listener.calls.load(Ordering::SeqCst) > 0
            })
            .await;
        main.run_pending();

        assert!(ready);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);

        let index = access.index().unwrap();
        let bucketed: usize = (0..index.bucket_count())
            .filter_map(|i| index.bucket_image_count(i))
            .sum();
        assert_eq!(index.image_count(), 4);
        assert_eq!(bucketed, 3);
    }

    #[tokio::test]
    async fn test_late_listener_gets_scheduled_notification() {
        let (access, mut main) = GalleryAccess::start(
            GalleryConfig::default(),
            FakeStore::with_records(sample_records()),
            Handle::current(),
        );
        access.prepare();
        main.run_until(Duration::from_secs(5), || access.is_prepared())
            .await;

        let late = Arc::new(CountingListener::default());
        access.register_ready_listener(&late).unwrap();
        assert_eq!(late.calls.load(Ordering::SeqCst), 0);

        main.run_pending();
        assert_eq!(late.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_listener_is_not_notified() {
        let (access, mut main) = GalleryAccess::start(
            GalleryConfig::default(),
            FakeStore::with_records(sample_records()),
            Handle::current(),
        );
        let kept = Arc::new(CountingListener::default());
        let removed = Arc::new(CountingListener::default());

        access.register_ready_listener(&kept).unwrap();
        access.register_ready_listener(&removed).unwrap();
        access.unregister_ready_listener(&removed);
        access.prepare();

        main.run_until(Duration::from_secs(5), || {
            kept.calls.load(Ordering::SeqCst) == 1
        })
        .await;
        assert_eq!(removed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let (access, mut main) = GalleryAccess::start(
            GalleryConfig::default(),
            FakeStore::unavailable(),
            Handle::current(),
        );
        let listener = Arc::new(CountingListener::default());
        access.register_ready_listener(&listener).unwrap();
        access.prepare();

        let failed = main
            .run_until(Duration::from_secs(5), || {
                listener.failures.load(Ordering::SeqCst) > 0
            })
            .await;
        main.run_pending();

        assert!(failed);
        assert_eq!(access.status(), IndexStatus::Failed);
        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(access.index(), Err(GalleryError::IndexFailed(_))));
        assert!(access.register_ready_listener(&listener).is_err());

        // No rebuild on the same instance
        access.prepare();
        main.run_pending();
        assert_eq!(access.status(), IndexStatus::Failed);
        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_panic_fails_the_index() {
        let (access, mut main) = GalleryAccess::start(
            GalleryConfig::default(),
            Arc::new(CrashingStore),
            Handle::current(),
        );
        let listener = Arc::new(CountingListener::default());
        access.register_ready_listener(&listener).unwrap();
        access.prepare();

        let failed = main
            .run_until(Duration::from_secs(5), || {
                listener.failures.load(Ordering::SeqCst) == 1
            })
            .await;

        assert!(failed);
        assert_eq!(access.status(), IndexStatus::Failed);
        assert_eq!(
            access.index().unwrap_err(),
            GalleryError::IndexFailed("index build panicked".to_string())
        );
    }

    #[tokio::test]
    async fn test_reregistered_listener_moves_to_the_end() {
        let (access, mut main) = GalleryAccess::start(
            GalleryConfig::default(),
            FakeStore::with_records(sample_records()),
            Handle::current(),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(NamedListener {
            name: "first",
            log: Arc::clone(&log),
        });
        let second = Arc::new(NamedListener {
            name: "second",
            log: Arc::clone(&log),
        });

        access.register_ready_listener(&first).unwrap();
        access.register_ready_listener(&second).unwrap();
        access.register_ready_listener(&first).unwrap();
        access.prepare();

        main.run_until(Duration::from_secs(5), || log.lock().unwrap().len() == 2)
            .await;
        main.run_pending();

        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_thumbnails_use_configured_size() {
        let config = GalleryConfig {
            display_width: 300,
            ..Default::default()
        };
        let (access, mut main) = GalleryAccess::start(
            config,
            FakeStore::with_records(sample_records()),
            Handle::current(),
        );

        struct SizeRecorder(Mutex<Option<u32>>);
        impl ThumbnailReceiver for SizeRecorder {
            fn on_thumbnail_ready(&self, _id: ImageId, thumbnail: Arc<Thumbnail>) {
                *self.0.lock().unwrap() = Some(thumbnail.width());
            }
        }

        let recorder = Arc::new(SizeRecorder(Mutex::new(None)));
        access.get_thumbnail(ImageId(1), &recorder);
        main.run_until(Duration::from_secs(5), || recorder.0.lock().unwrap().is_some())
            .await;

        assert_eq!(*recorder.0.lock().unwrap(), Some(100));
        assert!(access.cached_thumbnail(ImageId(1)).is_some());
    }
}
