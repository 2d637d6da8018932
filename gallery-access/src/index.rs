use crate::models::{ImageId, ImageRecord};
use std::collections::HashMap;

/// A named group of images (album/folder)
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    /// Flat positions of the bucket's images, in index order
    positions: Vec<usize>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Immutable snapshot of the image store, grouped into buckets.
///
/// Flat positions follow the store order (newest first). Bucket numbering
/// follows the order in which bucket names first show up in that sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaIndex {
    records: Vec<ImageRecord>,
    buckets: Vec<Bucket>,
    by_id: HashMap<ImageId, usize>,
}

impl MediaIndex {
    /// Build the index from records already sorted newest first
    pub fn from_records(records: Vec<ImageRecord>) -> Self {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut bucket_lookup: HashMap<String, usize> = HashMap::new();
        let mut by_id = HashMap::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            by_id.entry(record.id).or_insert(position);

            let Some(name) = record.bucket.as_deref() else {
                continue;
            };

            let bucket_index = match bucket_lookup.get(name) {
                Some(&index) => index,
                None => {
                    buckets.push(Bucket {
                        name: name.to_string(),
                        positions: Vec::new(),
                    });
                    bucket_lookup.insert(name.to_string(), buckets.len() - 1);
                    buckets.len() - 1
                }
            };

            buckets[bucket_index].positions.push(position);
        }

        log::debug!(
            "Indexed {} images in {} buckets",
            records.len(),
            buckets.len()
        );

        Self {
            records,
            buckets,
            by_id,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_name(&self, bucket_index: usize) -> Option<&str> {
        self.buckets.get(bucket_index).map(|b| b.name.as_str())
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Total number of indexed images, with or without a bucket
    pub fn image_count(&self) -> usize {
        self.records.len()
    }

    pub fn bucket_image_count(&self, bucket_index: usize) -> Option<usize> {
        self.buckets.get(bucket_index).map(Bucket::len)
    }

    /// Image at a flat position
    pub fn image_at(&self, position: usize) -> Option<&ImageRecord> {
        self.records.get(position)
    }

    /// Image at `position` within bucket `bucket_index`
    pub fn bucket_image_at(&self, bucket_index: usize, position: usize) -> Option<&ImageRecord> {
        let flat = *self.buckets.get(bucket_index)?.positions.get(position)?;
        self.records.get(flat)
    }

    pub fn record(&self, id: ImageId) -> Option<&ImageRecord> {
        self.by_id.get(&id).and_then(|&pos| self.records.get(pos))
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }
}
