//! Opaque identifiers for the three tiers of the data model.

use uuid::Uuid;

/// Stable opaque identifier for a collection.
pub type CollectionId = Uuid;
/// Stable opaque identifier for a group within a collection.
pub type GroupId = Uuid;
/// Stable opaque identifier for a record within a group.
pub type RecordId = Uuid;

/// Generates a fresh random id for any of the three tiers.
#[inline]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}
