use crate::models::ImageId;
use crate::thumbnail::Thumbnail;
use std::collections::HashMap;
use std::sync::Arc;

struct CacheEntry {
    thumbnail: Arc<Thumbnail>,
    cost: usize,
    last_access: u64,
}

impl CacheEntry {
    /// Nobody outside the cache holds the thumbnail anymore
    fn is_evictable(&self) -> bool {
        Arc::strong_count(&self.thumbnail) == 1
    }
}

/// Thumbnail cache bounded by a byte budget.
///
/// Entries whose `Arc<Thumbnail>` is still held elsewhere are never evicted,
/// so the budget can be exceeded while the UI keeps many thumbnails alive.
/// Among evictable entries the least recently used goes first.
pub struct BitmapCache {
    capacity: usize,
    /// capacity minus the cost of all entries; negative while overcommitted
    available: i64,
    entries: HashMap<ImageId, CacheEntry>,
    access_counter: u64,
}

impl std::fmt::Debug for BitmapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapCache")
            .field("capacity", &self.capacity)
            .field("available", &self.available)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl BitmapCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: capacity as i64,
            entries: HashMap::new(),
            access_counter: 0,
        }
    }

    pub fn get(&mut self, id: ImageId) -> Option<Arc<Thumbnail>> {
        self.access_counter += 1;
        let entry = self.entries.get_mut(&id)?;
        entry.last_access = self.access_counter;
        Some(Arc::clone(&entry.thumbnail))
    }

    /// Insert a thumbnail and return the shared handle now owned by the cache
    pub fn put(&mut self, id: ImageId, thumbnail: Thumbnail) -> Arc<Thumbnail> {
        if let Some(previous) = self.entries.remove(&id) {
            self.available += previous.cost as i64;
        }

        let cost = thumbnail.byte_cost();
        let thumbnail = Arc::new(thumbnail);

        self.access_counter += 1;
        self.entries.insert(
            id,
            CacheEntry {
                thumbnail: Arc::clone(&thumbnail),
                cost,
                last_access: self.access_counter,
            },
        );
        self.available -= cost as i64;

        while self.available < 0 {
            let Some(victim) = self.find_free_entry() else {
                log::debug!(
                    "Thumbnail cache over budget by {} bytes, nothing evictable",
                    -self.available
                );
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                log::trace!("Evicting thumbnail {} ({} bytes)", victim, evicted.cost);
                self.available += evicted.cost as i64;
            }
        }

        thumbnail
    }

    /// Least recently used entry that is not referenced outside the cache
    fn find_free_entry(&self) -> Option<ImageId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_evictable())
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(id, _)| *id)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of the costs of all cached thumbnails
    pub fn used_bytes(&self) -> usize {
        (self.capacity as i64 - self.available).max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 thumbnail, 400 bytes
    fn thumb() -> Thumbnail {
        Thumbnail::blank(10, 10)
    }

    #[test]
    fn test_unreferenced_entries_are_evicted_to_fit() {
        let mut cache = BitmapCache::new(1000);
        for i in 0..5 {
            // Drop the returned handle right away
            cache.put(ImageId(i), thumb());
        }

        assert!(cache.used_bytes() <= 1000);
        assert_eq!(cache.len(), 2);
        // The newest entries survive
        assert!(cache.contains(ImageId(3)));
        assert!(cache.contains(ImageId(4)));
    }

    #[test]
    fn test_referenced_entries_are_never_evicted() {
        let mut cache = BitmapCache::new(1000);
        let held: Vec<_> = (0..5).map(|i| cache.put(ImageId(i), thumb())).collect();

        assert_eq!(cache.len(), 5);
        assert_eq!(cache.used_bytes(), 2000);
        for i in 0..5 {
            assert!(cache.contains(ImageId(i)));
        }

        drop(held);
        cache.put(ImageId(10), thumb());
        assert!(cache.used_bytes() <= 1000);
        assert!(cache.contains(ImageId(10)));
    }

    #[test]
    fn test_mixed_references_keep_held_entries() {
        let mut cache = BitmapCache::new(1000);
        let kept = cache.put(ImageId(0), thumb());
        cache.put(ImageId(1), thumb());
        cache.put(ImageId(2), thumb());
        cache.put(ImageId(3), thumb());

        assert!(cache.contains(ImageId(0)));
        assert!(cache.used_bytes() <= 1000);
        drop(kept);
    }

    #[test]
    fn test_replacing_an_entry_refunds_its_cost() {
        let mut cache = BitmapCache::new(1000);
        cache.put(ImageId(1), thumb());
        cache.put(ImageId(1), Thumbnail::blank(5, 5));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 100);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = BitmapCache::new(800);
        cache.put(ImageId(1), thumb());
        cache.put(ImageId(2), thumb());

        // Touch 1 so that 2 becomes the eviction candidate
        drop(cache.get(ImageId(1)));
        cache.put(ImageId(3), thumb());

        assert!(cache.contains(ImageId(1)));
        assert!(!cache.contains(ImageId(2)));
        assert!(cache.contains(ImageId(3)));
    }

    #[test]
    fn test_oversized_thumbnail_stays_while_referenced() {
        let mut cache = BitmapCache::new(100);
        let big = cache.put(ImageId(1), thumb());
        assert!(cache.contains(ImageId(1)));
        assert_eq!(cache.used_bytes(), 400);
        drop(big);
    }

    #[test]
    fn test_miss_returns_none() {
        let mut cache = BitmapCache::new(100);
        assert!(cache.get(ImageId(1)).is_none());
        assert!(cache.is_empty());
    }
}
