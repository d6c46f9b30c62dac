//! Metadata filter expressions for the query planner (spec.md §4.5).
//!
//! Unlike the teacher's generic field/condition expression tree, this filter
//! is a fixed, AND-combined set of fields — the engine only ever needs to
//! express the predicates a record's [`crate::metadata::Metadata`] actually
//! carries, so there is no value in a general-purpose expression language.

pub mod bitmap_index;

pub use bitmap_index::MetadataBitmapIndex;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::ids::GroupId;
use crate::record::Record;

/// All fields are independently optional and AND-combined. A present filter
/// with every field `None` is treated as empty (see [`MetadataFilter::is_empty`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Non-empty intersection with `record.tags` required.
    pub tags_any: Option<BTreeSet<String>>,
    /// `record.tags` must be a superset of this set.
    pub tags_all: Option<BTreeSet<String>>,
    pub author: Option<String>,
    pub group_id: Option<GroupId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring match over `record.text`.
    pub text_contains: Option<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.tags_any.is_none()
            && self.tags_all.is_none()
            && self.author.is_none()
            && self.group_id.is_none()
            && self.created_from.is_none()
            && self.created_to.is_none()
            && self.text_contains.is_none()
    }

    /// The source of truth for whether a record matches. The bitmap index is
    /// a pre-filter accelerator only; every candidate it returns is still
    /// confirmed against this method before being scored.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(tags_any) = &self.tags_any {
            if tags_any.is_disjoint(&record.metadata.tags) {
                return false;
            }
        }
        if let Some(tags_all) = &self.tags_all {
            if !tags_all.is_subset(&record.metadata.tags) {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if record.metadata.author.as_deref() != Some(author.as_str()) {
                return false;
            }
        }
        if let Some(group_id) = &self.group_id {
            if record.group_id != *group_id {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if record.metadata.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if record.metadata.created_at > to {
                return false;
            }
        }
        if let Some(needle) = &self.text_contains {
            if !record.text.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn record_with(author: &str, tags: &[&str], text: &str) -> Record {
        let mut metadata = Metadata::new().with_author(author.to_string());
        metadata = metadata.with_tags(tags.iter().map(|t| t.to_string()));
        Record::new(
            crate::ids::new_id(),
            crate::ids::new_id(),
            text.to_string(),
            vec![1.0, 0.0],
            metadata,
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&record_with("alice", &["rust"], "hello world")));
    }

    #[test]
    fn test_tags_any_requires_intersection() {
        let mut filter = MetadataFilter::default();
        filter.tags_any = Some(["python"].into_iter().map(String::from).collect());
        assert!(!filter.matches(&record_with("alice", &["rust"], "hello")));

        filter.tags_any = Some(["rust"].into_iter().map(String::from).collect());
        assert!(filter.matches(&record_with("alice", &["rust"], "hello")));
    }

    #[test]
    fn test_tags_all_requires_subset() {
        let mut filter = MetadataFilter::default();
        filter.tags_all = Some(["rust", "async"].into_iter().map(String::from).collect());
        assert!(!filter.matches(&record_with("alice", &["rust"], "hello")));
        assert!(filter.matches(&record_with("alice", &["rust", "async", "extra"], "hello")));
    }

    #[test]
    fn test_text_contains_case_insensitive() {
        let mut filter = MetadataFilter::default();
        filter.text_contains = Some("HELLO".to_string());
        assert!(filter.matches(&record_with("alice", &[], "say hello there")));
        assert!(!filter.matches(&record_with("alice", &[], "goodbye")));
    }

    #[test]
    fn test_author_mismatch_excludes() {
        let mut filter = MetadataFilter::default();
        filter.author = Some("bob".to_string());
        assert!(!filter.matches(&record_with("alice", &[], "text")));
    }
}
