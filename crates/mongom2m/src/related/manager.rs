//! The relationship manager.
//!
//! A [`RelatedManager`] is the bound view of one many-to-many field on one
//! host document. It owns nothing itself: the cells live inside the host
//! [`Document`] and are written back into the host's record when the host is
//! saved. Every mutation is bracketed by a `pre_*` and a `post_*`
//! notification on [`M2M_CHANGED`](crate::related::signals::M2M_CHANGED)
//! carrying the same `pk_set`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::Bson;
use mongom2m_core::logging::relation_span;
use mongom2m_core::{M2MError, M2MResult};

use crate::database::Database;
use crate::document::Document;
use crate::query::lookups::Q;
use crate::related::cell::{ReferenceCell, Related};
use crate::related::queryset::{Entry, M2MQuerySet, QueryOptions, RowPresentation};
use crate::related::rel::ManyToManyRel;
use crate::related::signals::{send_m2m_changed, M2MAction};
use crate::value::Value;

/// Manager of one relationship field bound to one host document.
pub struct RelatedManager<'a> {
    db: &'a Database,
    rel: Arc<ManyToManyRel>,
    host: &'a mut Document,
}

impl<'a> RelatedManager<'a> {
    pub(crate) fn new(db: &'a Database, rel: Arc<ManyToManyRel>, host: &'a mut Document) -> Self {
        Self { db, rel, host }
    }

    /// The relationship descriptor.
    pub const fn rel(&self) -> &Arc<ManyToManyRel> {
        &self.rel
    }

    /// The host document.
    pub fn host(&self) -> &Document {
        self.host
    }

    fn cells(&self) -> &[ReferenceCell] {
        self.host.cells(self.rel.name())
    }

    fn notify(&self, action: M2MAction, pk_set: &[String]) {
        send_m2m_changed(&self.rel, self.host, action, pk_set, self.db.alias());
    }

    fn finish(&mut self, auto_save: bool) -> M2MResult<()> {
        if auto_save {
            self.db.save(self.host)?;
        }
        Ok(())
    }

    fn to_cell(&self, item: Related) -> M2MResult<ReferenceCell> {
        if let Related::Document(doc) = &item {
            let target = self.rel.target();
            if doc.meta().label_lower() != target.label_lower() {
                return Err(M2MError::InvalidArgument(format!(
                    "'{}' expects {} instances, got {}",
                    self.rel.name(),
                    target.object_name,
                    doc.meta().object_name
                )));
            }
        }
        item.into_cell()
    }

    /// Adds documents or identifiers.
    ///
    /// Identifiers already present, or repeated within `items`, are skipped.
    pub fn add<I>(&mut self, items: I, auto_save: bool) -> M2MResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Related>,
    {
        let _span = relation_span(self.rel.name(), &self.host.meta().label()).entered();

        let mut seen: HashSet<ObjectId> = self.cells().iter().map(ReferenceCell::pk).collect();
        let mut added = Vec::new();
        for item in items {
            let cell = self.to_cell(item.into())?;
            if seen.insert(cell.pk()) {
                added.push(cell);
            }
        }
        let pk_set = hex_set(added.iter().map(ReferenceCell::pk));

        self.notify(M2MAction::PreAdd, &pk_set);
        self.host.cells_mut(self.rel.name()).extend(added);
        self.notify(M2MAction::PostAdd, &pk_set);

        tracing::debug!(added = pk_set.len(), total = self.count(), "related documents added");
        self.finish(auto_save)
    }

    /// Removes documents or identifiers. Non-members are ignored.
    pub fn remove<I>(&mut self, items: I, auto_save: bool) -> M2MResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Related>,
    {
        let _span = relation_span(self.rel.name(), &self.host.meta().label()).entered();

        let wanted = items
            .into_iter()
            .map(|item| item.into().pk())
            .collect::<M2MResult<HashSet<ObjectId>>>()?;
        let pk_set = hex_set(
            self.cells()
                .iter()
                .map(ReferenceCell::pk)
                .filter(|pk| wanted.contains(pk)),
        );

        self.notify(M2MAction::PreRemove, &pk_set);
        self.host
            .cells_mut(self.rel.name())
            .retain(|cell| !wanted.contains(&cell.pk()));
        self.notify(M2MAction::PostRemove, &pk_set);

        tracing::debug!(removed = pk_set.len(), total = self.count(), "related documents removed");
        self.finish(auto_save)
    }

    /// Removes every related document.
    pub fn clear(&mut self, auto_save: bool) -> M2MResult<()> {
        let _span = relation_span(self.rel.name(), &self.host.meta().label()).entered();

        let pk_set = hex_set(self.cells().iter().map(ReferenceCell::pk));

        self.notify(M2MAction::PreClear, &pk_set);
        self.host.set_cells(self.rel.name(), Vec::new());
        self.notify(M2MAction::PostClear, &pk_set);

        tracing::debug!(removed = pk_set.len(), "relationship cleared");
        self.finish(auto_save)
    }

    /// Removes the identifiers whose document no longer exists and returns
    /// how many were dropped.
    ///
    /// Signals are sent like for [`remove`](Self::remove), with an empty set
    /// when nothing dangles.
    pub fn remove_nonexists(&mut self, auto_save: bool) -> M2MResult<usize> {
        let ids = self.ids();
        let existing = self.db.existing_pks(self.rel.target(), &ids)?;
        let missing: Vec<ObjectId> = ids.into_iter().filter(|pk| !existing.contains(pk)).collect();
        let dropped = missing.len();
        if dropped > 0 {
            tracing::info!(
                field = %self.rel.name(),
                host = %self.host,
                dropped,
                "removing dangling references"
            );
        }
        self.remove(missing, auto_save)?;
        Ok(dropped)
    }

    /// Reloads every target from storage, replacing stale cached copies and
    /// dropping references whose document is gone.
    pub fn reload_from_db(&mut self, auto_save: bool) -> M2MResult<()> {
        let fresh = self.all_with(QueryOptions::fresh())?.documents()?;
        self.clear(false)?;
        self.add(fresh, false)?;
        self.finish(auto_save)
    }

    /// Creates and saves a target document, then adds it.
    pub fn create<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>, auto_save: bool) -> M2MResult<Document>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut doc = Document::from_values(self.rel.target(), values)?;
        self.db.save(&mut doc)?;
        self.add([doc.clone()], auto_save)?;
        Ok(doc)
    }

    /// Membership by identifier. Unsaved documents are never members.
    pub fn contains(&self, item: impl Into<Related>) -> bool {
        item.into()
            .pk()
            .is_ok_and(|pk| self.cells().iter().any(|cell| cell.pk() == pk))
    }

    /// The number of held identifiers, dangling ones included.
    pub fn count(&self) -> usize {
        self.cells().len()
    }

    /// Returns `true` if nothing is related.
    pub fn is_empty(&self) -> bool {
        self.cells().is_empty()
    }

    /// The held identifiers, in order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.cells().iter().map(ReferenceCell::pk).collect()
    }

    /// Resolves every target, caching loaded copies in the host's cells.
    /// Dangling identifiers are skipped.
    pub fn objects(&mut self) -> M2MResult<Vec<Document>> {
        let db = self.db;
        let rel = Arc::clone(&self.rel);
        let mut out = Vec::with_capacity(self.count());
        for cell in self.host.cells_mut(rel.name()).iter_mut() {
            if let Some(doc) = cell.document() {
                out.push(doc.clone());
                continue;
            }
            match db.find_by_pk(rel.target(), cell.pk())? {
                Some(doc) => {
                    cell.cache(doc.clone());
                    out.push(doc);
                }
                None => tracing::debug!(pk = %cell.pk(), "skipping dangling reference"),
            }
        }
        Ok(out)
    }

    /// A query set over the current cells, using cached copies.
    pub fn all(&self) -> M2MQuerySet<'a> {
        M2MQuerySet::new(
            self.db,
            Arc::clone(&self.rel),
            Arc::clone(self.rel.target()),
            self.cells().to_vec(),
            true,
        )
    }

    /// A query set over the current cells with explicit read options.
    pub fn all_with(&self, options: QueryOptions) -> M2MResult<M2MQuerySet<'a>> {
        M2MQuerySet::with_options(
            self.db,
            Arc::clone(&self.rel),
            Arc::clone(self.rel.target()),
            self.cells().to_vec(),
            options,
        )
    }

    /// The related documents matching `q` in storage.
    pub fn filter(&self, q: &Q) -> M2MResult<M2MQuerySet<'a>> {
        self.all().filter(q)
    }

    /// The related document with identifier `pk`, if held and still stored.
    pub fn get(&self, pk: impl Into<Related>) -> M2MResult<Option<Document>> {
        Ok(self.all().get(pk)?.map(Entry::into_document))
    }

    /// The current cells presented as relationship rows of this host.
    pub fn relationship_queryset(&self) -> M2MResult<M2MQuerySet<'a>> {
        let through = self.rel.through().ok_or_else(|| {
            M2MError::ImproperlyConfigured(format!(
                "{}.{} has no relationship type",
                self.rel.host().object_name,
                self.rel.name()
            ))
        })?;
        Ok(self.all().as_rows(RowPresentation::Forward {
            through: Arc::clone(through),
            host: self.host.clone(),
        }))
    }

    /// Serializes the cells into the stored column value.
    pub fn encode(&mut self) -> M2MResult<Bson> {
        let db = self.db;
        let rel = Arc::clone(&self.rel);
        rel.codec().encode(self.host.cells_mut(rel.name()), db)
    }

    /// Replaces the cells with the ones decoded from a stored column value.
    pub fn decode(&mut self, stored: &Bson) {
        let cells = self.rel.codec().decode(stored);
        self.host.set_cells(self.rel.name(), cells);
    }
}

impl fmt::Debug for RelatedManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelatedManager")
            .field("field", &self.rel.name())
            .field("host", &self.host.to_string())
            .field("ids", &self.ids())
            .finish()
    }
}

fn hex_set(pks: impl Iterator<Item = ObjectId>) -> Vec<String> {
    pks.map(|pk| pk.to_hex()).collect()
}
