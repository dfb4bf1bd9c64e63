//! Storage driver interface.
//!
//! [`DocumentStore`] is the narrow interface the relationship layer needs
//! from a document database: filtered reads, upsert by primary key, and
//! deletes. Records and filters are BSON documents in the Mongo query
//! dialect, so a driver for a real server only needs to forward them.
//! [`MemoryStore`] is an in-process implementation.

pub mod memory;

pub use memory::MemoryStore;

use mongom2m_core::M2MResult;

/// A synchronous document storage driver.
///
/// Every call is atomic per document; no multi-document transaction is
/// implied. Saving a record replaces any stored record with the same `_id`.
pub trait DocumentStore: Send + Sync {
    /// Returns every record of `collection` matching `filter`, in storage order.
    fn find(&self, collection: &str, filter: &bson::Document) -> M2MResult<Vec<bson::Document>>;

    /// Returns the first matching record, if any.
    fn find_one(&self, collection: &str, filter: &bson::Document) -> M2MResult<Option<bson::Document>> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Counts the matching records.
    fn count(&self, collection: &str, filter: &bson::Document) -> M2MResult<usize> {
        Ok(self.find(collection, filter)?.len())
    }

    /// Inserts or replaces a record keyed by its `_id`.
    fn save(&self, collection: &str, record: bson::Document) -> M2MResult<()>;

    /// Deletes every matching record and returns how many were removed.
    fn delete(&self, collection: &str, filter: &bson::Document) -> M2MResult<u64>;
}
