//! The metadata bundle attached to groups and records (spec.md §3).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author / tags / source / timestamps bundle shared by groups and records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    /// Creates a fresh metadata bundle stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            author: None,
            tags: BTreeSet::new(),
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Stamps `updated_at` to now, as every record/group mutation does.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
