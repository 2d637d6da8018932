//! Picker selection logic, independent of any UI toolkit.
//!
//! [`Selection`] is a small state machine over `(mode, event)`; the view layer
//! only forwards taps and long presses and redraws check marks from
//! [`Selection::contains`]. [`PickerSession`] ties a selection to the media
//! index the way a picker screen would: bucket spinner, grid positions,
//! done/close buttons.

use crate::index::MediaIndex;
use crate::models::{ImageId, ImageRecord};
use crate::service::{GalleryAccess, GalleryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default cap for multi selection
pub const DEFAULT_MULTI_SELECT_MAX_COUNT: usize = 7;

/// Title of the spinner entry that shows every image
pub const ALL_IMAGES_LABEL: &str = "Gallery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// A tap picks the image and finishes the picker
    SingleImmediate,
    /// A tap picks the image, the user confirms with "done"
    SingleWait,
    /// Single selection until a long press starts multi selection
    MultiLongPress,
    /// Every tap toggles
    Multi,
}

impl SelectionMode {
    pub fn is_multi_select(&self) -> bool {
        matches!(self, SelectionMode::Multi | SelectionMode::MultiLongPress)
    }
}

/// Launch configuration of the picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    pub selection_mode: SelectionMode,
    /// 0 means unlimited
    pub max_selection_count: usize,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            selection_mode: SelectionMode::MultiLongPress,
            max_selection_count: DEFAULT_MULTI_SELECT_MAX_COUNT,
        }
    }
}

impl PickerConfig {
    /// Single selection; `finish_on_selection` returns on the first tap
    pub fn single(finish_on_selection: bool) -> Self {
        Self {
            selection_mode: if finish_on_selection {
                SelectionMode::SingleImmediate
            } else {
                SelectionMode::SingleWait
            },
            max_selection_count: 1,
        }
    }

    /// Multi selection; without `default_multi_select` the user enters multi
    /// selection by long pressing. `max_count` 0 means unlimited.
    pub fn multi(default_multi_select: bool, max_count: usize) -> Self {
        Self {
            selection_mode: if default_multi_select {
                SelectionMode::Multi
            } else {
                SelectionMode::MultiLongPress
            },
            max_selection_count: max_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    Tap(ImageId),
    LongPress(ImageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The event was handled but nothing changed (e.g. selection is full)
    Unchanged,
    Changed,
    /// The picker should return this image right away
    Finished(ImageId),
    /// The event does not apply to this mode and was not consumed
    Ignored,
}

/// Ordered set of selected images, in the order the user picked them
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    mode: SelectionMode,
    max_count: usize,
    selected: Vec<ImageId>,
}

impl Selection {
    pub fn new(config: &PickerConfig) -> Self {
        let max_count = match config.max_selection_count {
            0 => usize::MAX,
            n => n,
        };
        Self {
            mode: config.selection_mode,
            max_count,
            selected: Vec::with_capacity(DEFAULT_MULTI_SELECT_MAX_COUNT),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn selected(&self) -> &[ImageId] {
        &self.selected
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn apply(&mut self, event: SelectionEvent) -> SelectionOutcome {
        use SelectionEvent::*;
        use SelectionMode::*;

        match (self.mode, event) {
            (SingleImmediate, Tap(id)) => {
                self.replace_with(id);
                SelectionOutcome::Finished(id)
            }
            (SingleWait, Tap(id)) => {
                if !self.contains(id) || self.len() > 1 {
                    self.replace_with(id);
                    SelectionOutcome::Changed
                } else {
                    SelectionOutcome::Unchanged
                }
            }
            (MultiLongPress, Tap(id)) => {
                if self.len() > 1 {
                    self.toggle(id)
                } else if !self.contains(id) {
                    self.replace_with(id);
                    SelectionOutcome::Changed
                } else {
                    self.clear();
                    SelectionOutcome::Changed
                }
            }
            (Multi, Tap(id)) | (MultiLongPress, LongPress(id)) => self.toggle(id),
            (SingleImmediate | SingleWait | Multi, LongPress(_)) => SelectionOutcome::Ignored,
        }
    }

    fn replace_with(&mut self, id: ImageId) {
        self.selected.clear();
        self.selected.push(id);
    }

    /// Deselect if selected, otherwise select when below the cap
    fn toggle(&mut self, id: ImageId) -> SelectionOutcome {
        if let Some(pos) = self.selected.iter().position(|s| *s == id) {
            self.selected.remove(pos);
            SelectionOutcome::Changed
        } else if self.selected.len() < self.max_count {
            self.selected.push(id);
            SelectionOutcome::Changed
        } else {
            SelectionOutcome::Unchanged
        }
    }
}

/// What the picker hands back to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "images", rename_all = "snake_case")]
pub enum PickerResult {
    Single(ImageRecord),
    Multiple(Vec<ImageRecord>),
    Cancelled,
}

/// Which images the grid shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketFilter {
    All,
    Bucket(usize),
}

/// One running picker screen
pub struct PickerSession {
    gallery: Arc<GalleryAccess>,
    config: PickerConfig,
    filter: BucketFilter,
    selection: Selection,
    result: Option<PickerResult>,
}

impl std::fmt::Debug for PickerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickerSession")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("selection", &self.selection)
            .field("result", &self.result)
            .finish()
    }
}

impl PickerSession {
    /// Open a picker on `gallery` and kick off index preparation
    pub fn launch(gallery: Arc<GalleryAccess>, config: PickerConfig) -> Self {
        gallery.prepare();
        let selection = Selection::new(&config);
        Self {
            gallery,
            config,
            filter: BucketFilter::All,
            selection,
            result: None,
        }
    }

    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn filter(&self) -> BucketFilter {
        self.filter
    }

    /// Set once the picker finished or was closed
    pub fn result(&self) -> Option<&PickerResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Spinner labels: the "all images" entry followed by every bucket name
    pub fn spinner_entries(&self) -> Vec<String> {
        let mut entries = vec![ALL_IMAGES_LABEL.to_string()];
        if let Ok(index) = self.gallery.index() {
            entries.extend(index.buckets().iter().map(|b| b.name.clone()));
        }
        entries
    }

    /// Select a spinner entry; position 0 shows all images
    pub fn select_spinner(&mut self, position: usize) {
        self.filter = match position {
            0 => BucketFilter::All,
            n => BucketFilter::Bucket(n - 1),
        };
    }

    /// Number of grid cells. Zero until the index is ready.
    pub fn visible_count(&self) -> usize {
        let Ok(index) = self.gallery.index() else {
            return 0;
        };
        match self.filter {
            BucketFilter::All => index.image_count(),
            BucketFilter::Bucket(b) => index.bucket_image_count(b).unwrap_or(0),
        }
    }

    /// Image shown at grid `position`
    pub fn image_at(&self, position: usize) -> Result<Option<ImageRecord>, GalleryError> {
        let index = self.gallery.index()?;
        Ok(self.lookup(&index, position).cloned())
    }

    fn lookup<'a>(&self, index: &'a MediaIndex, position: usize) -> Option<&'a ImageRecord> {
        match self.filter {
            BucketFilter::All => index.image_at(position),
            BucketFilter::Bucket(b) => index.bucket_image_at(b, position),
        }
    }

    pub fn tap(&mut self, position: usize) -> Result<SelectionOutcome, GalleryError> {
        self.handle(position, SelectionEvent::Tap)
    }

    pub fn long_press(&mut self, position: usize) -> Result<SelectionOutcome, GalleryError> {
        self.handle(position, SelectionEvent::LongPress)
    }

    fn handle(
        &mut self,
        position: usize,
        event: fn(ImageId) -> SelectionEvent,
    ) -> Result<SelectionOutcome, GalleryError> {
        if self.is_finished() {
            return Ok(SelectionOutcome::Ignored);
        }

        let index = self.gallery.index()?;
        let Some(record) = self.lookup(&index, position) else {
            return Ok(SelectionOutcome::Ignored);
        };

        let outcome = self.selection.apply(event(record.id));
        if let SelectionOutcome::Finished(_) = outcome {
            log::debug!("Picked {}", record.id);
            self.result = Some(PickerResult::Single(record.clone()));
        }
        Ok(outcome)
    }

    /// "Done" button. Returns `None` and stays open while nothing is selected.
    pub fn done(&mut self) -> Option<PickerResult> {
        if self.selection.is_empty() {
            return None;
        }
        let index = self.gallery.index().ok()?;
        let records: Vec<ImageRecord> = self
            .selection
            .selected()
            .iter()
            .filter_map(|id| index.record(*id).cloned())
            .collect();

        let result = if self.selection.mode().is_multi_select() {
            PickerResult::Multiple(records)
        } else {
            PickerResult::Single(records.into_iter().next()?)
        };

        self.result = Some(result.clone());
        Some(result)
    }

    /// "Close" button
    pub fn close(&mut self) -> PickerResult {
        self.result = Some(PickerResult::Cancelled);
        PickerResult::Cancelled
    }
}
