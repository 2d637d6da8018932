//! Deduplicated thumbnail fetching.
//!
//! At most one fetch per image is in flight. Receivers that ask for an image
//! while its fetch is running are attached to the running request, held
//! weakly, and all get the same result on the completion context.

use crate::cache::BitmapCache;
use crate::models::ImageId;
use crate::store::ImageStore;
use crate::tasks::{BackgroundOutcome, TaskManager};
use crate::thumbnail::{Thumbnail, ThumbnailError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Gets notified when a requested thumbnail is available.
///
/// Callbacks run on the completion context.
pub trait ThumbnailReceiver: Send + Sync {
    fn on_thumbnail_ready(&self, id: ImageId, thumbnail: Arc<Thumbnail>);

    /// Called when the fetch failed or timed out. Ignored unless overridden.
    fn on_thumbnail_failed(&self, _id: ImageId, _error: &ThumbnailError) {}
}

type Receivers = Vec<Weak<dyn ThumbnailReceiver>>;

struct FetchState {
    cache: BitmapCache,
    in_flight: HashMap<ImageId, Receivers>,
}

/// Serves thumbnails from the cache or fetches them from the store
pub struct ThumbnailFetcher {
    store: Arc<dyn ImageStore>,
    tasks: TaskManager,
    thumbnail_size: u32,
    fetch_timeout: Option<Duration>,
    state: Arc<Mutex<FetchState>>,
}

impl std::fmt::Debug for ThumbnailFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailFetcher")
            .field("thumbnail_size", &self.thumbnail_size)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

fn lock(state: &Mutex<FetchState>) -> MutexGuard<'_, FetchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ThumbnailFetcher {
    pub fn new(
        store: Arc<dyn ImageStore>,
        tasks: TaskManager,
        cache_capacity: usize,
        thumbnail_size: u32,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            tasks,
            thumbnail_size,
            fetch_timeout,
            state: Arc::new(Mutex::new(FetchState {
                cache: BitmapCache::new(cache_capacity),
                in_flight: HashMap::with_capacity(50),
            })),
        }
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    /// Request the thumbnail for `id`. Never blocks; `receiver` is called back
    /// on the completion context, unless it has been dropped by then.
    pub fn get_thumbnail<R>(&self, id: ImageId, receiver: &Arc<R>)
    where
        R: ThumbnailReceiver + 'static,
    {
        let weak = Arc::downgrade(receiver);
        let weak: Weak<dyn ThumbnailReceiver> = weak;
        let mut state = lock(&self.state);

        if let Some(thumbnail) = state.cache.get(id) {
            drop(state);
            self.tasks.run_on_main(move || {
                if let Some(receiver) = weak.upgrade() {
                    receiver.on_thumbnail_ready(id, thumbnail);
                }
            });
            return;
        }

        if let Some(receivers) = state.in_flight.get_mut(&id) {
            log::trace!("Thumbnail {} already in flight, attaching receiver", id);
            receivers.push(weak);
            return;
        }

        state.in_flight.insert(id, vec![weak]);
        drop(state);

        self.start_fetch(id);
    }

    fn start_fetch(&self, id: ImageId) {
        let store = Arc::clone(&self.store);
        let size = self.thumbnail_size;
        let state = Arc::clone(&self.state);
        let tasks = self.tasks.clone();

        log::debug!("Fetching thumbnail {} at {}px", id, size);

        self.tasks.run_background_with_timeout(
            self.fetch_timeout,
            move || store.load_thumbnail(id, size),
            move |outcome| {
                let result = match outcome {
                    BackgroundOutcome::Finished(result) => result,
                    BackgroundOutcome::TimedOut(limit) => Err(ThumbnailError::Timeout(limit)),
                    BackgroundOutcome::Panicked => Err(ThumbnailError::ImageLoadError(
                        "thumbnail task panicked".to_string(),
                    )),
                };
                resolve(&state, &tasks, id, result);
            },
        );
    }

    /// Cached thumbnail for `id`, without fetching
    pub fn cached(&self, id: ImageId) -> Option<Arc<Thumbnail>> {
        lock(&self.state).cache.get(id)
    }

    pub fn is_in_flight(&self, id: ImageId) -> bool {
        lock(&self.state).in_flight.contains_key(&id)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// (used bytes, capacity) of the thumbnail cache
    pub fn cache_usage(&self) -> (usize, usize) {
        let state = lock(&self.state);
        (state.cache.used_bytes(), state.cache.capacity())
    }
}

/// Settle the in-flight request for `id` and schedule the fan-out
fn resolve(
    state: &Mutex<FetchState>,
    tasks: &TaskManager,
    id: ImageId,
    result: Result<Thumbnail, ThumbnailError>,
) {
    let mut guard = lock(state);

    match result {
        Ok(thumbnail) => {
            let thumbnail = guard.cache.put(id, thumbnail);
            let receivers = guard.in_flight.remove(&id).unwrap_or_default();
            drop(guard);

            tasks.run_on_main(move || {
                for receiver in receivers.iter().filter_map(Weak::upgrade) {
                    receiver.on_thumbnail_ready(id, Arc::clone(&thumbnail));
                }
            });
        }
        Err(e) => {
            log::error!("Failed to get thumbnail for {}: {}", id, e);
            let receivers = guard.in_flight.remove(&id).unwrap_or_default();
            drop(guard);

            let error = Arc::new(e);
            tasks.run_on_main(move || {
                for receiver in receivers.iter().filter_map(Weak::upgrade) {
                    receiver.on_thumbnail_failed(id, &error);
                }
            });
        }
    }
}
