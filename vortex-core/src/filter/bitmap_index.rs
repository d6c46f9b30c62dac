//! Bitmap-accelerated metadata pre-filter.
//!
//! Roaring bitmaps only store `u32` members, but record ids are 128-bit
//! UUIDs, so this index keeps a dense `u32` surrogate per live record and
//! indexes `author`/`tags`/`group_id` against that surrogate. `created_at`
//! ranges and `text_contains` are not bitmap-accelerable (they're range/
//! substring predicates, not discrete values), so [`MetadataBitmapIndex::candidates`]
//! only narrows on the fields it can and leaves the rest for
//! [`crate::filter::MetadataFilter::matches`] to confirm — this index is an
//! accelerator, never the source of truth.

use std::collections::HashMap;

use roaring::RoaringBitmap;

use crate::filter::MetadataFilter;
use crate::ids::{GroupId, RecordId};
use crate::record::Record;

#[derive(Debug, Default)]
pub struct MetadataBitmapIndex {
    author_index: HashMap<String, RoaringBitmap>,
    tag_index: HashMap<String, RoaringBitmap>,
    group_index: HashMap<GroupId, RoaringBitmap>,
    all: RoaringBitmap,
    surrogate_of: HashMap<RecordId, u32>,
    id_of: HashMap<u32, RecordId>,
    next_surrogate: u32,
}

impl MetadataBitmapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: &Record) {
        let surrogate = *self.surrogate_of.entry(record.id).or_insert_with(|| {
            let s = self.next_surrogate;
            self.next_surrogate += 1;
            s
        });
        self.id_of.insert(surrogate, record.id);
        self.all.insert(surrogate);

        if let Some(author) = &record.metadata.author {
            self.author_index.entry(author.clone()).or_default().insert(surrogate);
        }
        for tag in &record.metadata.tags {
            self.tag_index.entry(tag.clone()).or_default().insert(surrogate);
        }
        self.group_index.entry(record.group_id).or_default().insert(surrogate);
    }

    pub fn remove(&mut self, record: &Record) {
        let Some(surrogate) = self.surrogate_of.remove(&record.id) else {
            return;
        };
        self.id_of.remove(&surrogate);
        self.all.remove(surrogate);
        if let Some(author) = &record.metadata.author {
            if let Some(bitmap) = self.author_index.get_mut(author) {
                bitmap.remove(surrogate);
            }
        }
        for tag in &record.metadata.tags {
            if let Some(bitmap) = self.tag_index.get_mut(tag) {
                bitmap.remove(surrogate);
            }
        }
        if let Some(bitmap) = self.group_index.get_mut(&record.group_id) {
            bitmap.remove(surrogate);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Narrows to a candidate set using whichever of `author`/`tags_any`/
    /// `tags_all`/`group_id` are present; `None` means "no bitmap-accelerable
    /// predicate present — scan everything".
    pub fn candidates(&self, filter: &MetadataFilter) -> Option<RoaringBitmap> {
        let mut result: Option<RoaringBitmap> = None;
        let mut intersect = |bitmap: RoaringBitmap| {
            result = Some(match result.take() {
                Some(acc) => acc & bitmap,
                None => bitmap,
            });
        };

        if let Some(author) = &filter.author {
            intersect(self.author_index.get(author).cloned().unwrap_or_default());
        }
        if let Some(group_id) = &filter.group_id {
            intersect(self.group_index.get(group_id).cloned().unwrap_or_default());
        }
        if let Some(tags_any) = &filter.tags_any {
            let union = tags_any.iter().fold(RoaringBitmap::new(), |acc, tag| {
                acc | self.tag_index.get(tag).cloned().unwrap_or_default()
            });
            intersect(union);
        }
        if let Some(tags_all) = &filter.tags_all {
            if let Some(bitmap) = tags_all.iter().try_fold(self.all.clone(), |acc, tag| {
                self.tag_index.get(tag).map(|b| acc & b)
            }) {
                intersect(bitmap);
            } else {
                intersect(RoaringBitmap::new());
            }
        }

        result
    }

    pub fn record_id(&self, surrogate: u32) -> Option<RecordId> {
        self.id_of.get(&surrogate).copied()
    }
}
