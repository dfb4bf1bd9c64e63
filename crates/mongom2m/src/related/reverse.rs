//! Reverse accessors: from a target document back to its hosts.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document as BsonDocument};
use mongom2m_core::{M2MError, M2MResult};

use crate::database::Database;
use crate::document::Document;
use crate::query::lookups::Q;
use crate::related::cell::ReferenceCell;
use crate::related::queryset::{M2MQuerySet, RowPresentation};
use crate::related::rel::ManyToManyRel;

/// The hosts whose relationship field references one target document.
///
/// There is no index to consult: the host collection is scanned with a raw
/// query on the stored list. Hosts come back in storage order.
#[derive(Clone)]
pub struct ReverseManager<'db> {
    db: &'db Database,
    rel: Arc<ManyToManyRel>,
    target: Document,
}

impl<'db> ReverseManager<'db> {
    pub(crate) fn new(db: &'db Database, rel: Arc<ManyToManyRel>, target: Document) -> Self {
        Self { db, rel, target }
    }

    /// The relationship this accessor walks backwards.
    pub const fn rel(&self) -> &Arc<ManyToManyRel> {
        &self.rel
    }

    /// The referenced document.
    pub const fn target(&self) -> &Document {
        &self.target
    }

    /// The raw filter selecting the hosts that reference the target.
    ///
    /// Embedded lists are matched on the copy's primary key, and also on bare
    /// identifiers, which is how dangling references are stored.
    pub fn raw_filter(&self) -> M2MResult<BsonDocument> {
        let pk = Bson::ObjectId(self.target.require_pk()?);
        let mut by_column = BsonDocument::new();
        by_column.insert(self.rel.column(), pk.clone());
        if !self.rel.embeds() {
            return Ok(by_column);
        }
        let mut by_copy = BsonDocument::new();
        by_copy.insert(self.rel.pk_path(), pk);
        let mut filter = BsonDocument::new();
        filter.insert(
            "$or",
            Bson::Array(vec![Bson::Document(by_copy), Bson::Document(by_column)]),
        );
        Ok(filter)
    }

    /// Every host referencing the target.
    pub fn all(&self) -> M2MResult<Vec<Document>> {
        self.db.raw_query(self.rel.host(), &self.raw_filter()?)
    }

    /// The number of hosts referencing the target.
    pub fn count(&self) -> M2MResult<usize> {
        self.db
            .store()
            .count(&self.rel.host().db_table, &self.raw_filter()?)
    }

    /// The hosts as a query set of host documents.
    pub fn queryset(&self) -> M2MResult<M2MQuerySet<'db>> {
        let cells = self
            .all()?
            .into_iter()
            .map(ReferenceCell::with_document)
            .collect::<M2MResult<Vec<_>>>()?;
        Ok(M2MQuerySet::new(
            self.db,
            Arc::clone(&self.rel),
            Arc::clone(self.rel.host()),
            cells,
            true,
        ))
    }

    /// The referencing hosts matching `q`.
    pub fn filter(&self, q: &Q) -> M2MResult<M2MQuerySet<'db>> {
        self.queryset()?.filter(q)
    }

    /// The hosts presented as reverse relationship rows.
    pub fn relationship_queryset(&self) -> M2MResult<M2MQuerySet<'db>> {
        let through = self.rel.through().ok_or_else(|| {
            M2MError::ImproperlyConfigured(format!(
                "{}.{} has no relationship type",
                self.rel.host().object_name,
                self.rel.name()
            ))
        })?;
        Ok(self.queryset()?.as_rows(RowPresentation::Reverse {
            through: Arc::clone(through),
            target: self.target.clone(),
        }))
    }
}

impl fmt::Debug for ReverseManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverseManager")
            .field("accessor", &self.rel.related_name())
            .field("target", &self.target.to_string())
            .finish()
    }
}
