//! The query-set emulator.
//!
//! [`M2MQuerySet`] presents a snapshot of reference cells with query-set
//! style read access. Targets are resolved on demand by primary key and
//! cached in the snapshot's cells; identifiers whose document has been
//! deleted are skipped, never reported as errors. Narrowing operations
//! (`filter`, `exclude`, `none`) return new snapshots, so query sets never
//! share mutable state with each other or with the manager they came from.
//!
//! In *row mode* the query set yields [`RelationshipRow`]s instead of the
//! documents, which is how the through emulator makes a stored list look like
//! a join table.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;
use mongom2m_core::{M2MError, M2MResult};

use crate::database::Database;
use crate::document::{Document, DocumentType};
use crate::query::lookups::{Lookup, Q};
use crate::related::cell::{ReferenceCell, Related};
use crate::related::rel::ManyToManyRel;
use crate::related::through::{RelationshipRow, ThroughType};
use crate::value::Value;

/// Read options for building a query set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Use cached (possibly embedded) copies when present. When `false`,
    /// every read goes to storage.
    pub use_cached: bool,
    /// Drop identifiers whose document no longer exists when the query set
    /// is built.
    pub exists_in_db_only: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_cached: true,
            exists_in_db_only: false,
        }
    }
}

impl QueryOptions {
    /// Options that bypass every cached copy.
    pub const fn fresh() -> Self {
        Self {
            use_cached: false,
            exists_in_db_only: false,
        }
    }
}

/// Which side of the relationship a row-mode query set was opened from.
#[derive(Debug, Clone)]
pub enum RowPresentation {
    /// Cells are targets of `host`.
    Forward {
        /// The synthetic through type.
        through: Arc<ThroughType>,
        /// The host the cells belong to.
        host: Document,
    },
    /// Cells are hosts referencing `target`.
    Reverse {
        /// The synthetic through type.
        through: Arc<ThroughType>,
        /// The referenced document.
        target: Document,
    },
}

/// One item yielded by a query set.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A resolved document.
    Document(Document),
    /// A synthetic relationship row.
    Row(RelationshipRow),
}

impl Entry {
    /// The document for plain entries, the row's far side for rows.
    pub fn into_document(self) -> Document {
        match self {
            Self::Document(doc) => doc,
            Self::Row(row) => row.into_target(),
        }
    }

    /// Returns the row, if this entry is one.
    pub const fn as_row(&self) -> Option<&RelationshipRow> {
        match self {
            Self::Row(row) => Some(row),
            Self::Document(_) => None,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(doc) => write!(f, "{doc}"),
            Self::Row(row) => write!(f, "{row}"),
        }
    }
}

/// One row of a `values_list` projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuesListRow {
    /// A single value, for `flat` projections of one field.
    Flat(Value),
    /// One value per requested field.
    Tuple(Vec<Value>),
}

/// A snapshot of reference cells with query-set style access.
#[derive(Clone)]
pub struct M2MQuerySet<'db> {
    db: &'db Database,
    rel: Arc<ManyToManyRel>,
    model: Arc<DocumentType>,
    cells: Vec<ReferenceCell>,
    use_cached: bool,
    exists_in_db_only: bool,
    rows: Option<RowPresentation>,
    using: String,
}

impl<'db> M2MQuerySet<'db> {
    /// Builds a query set over `cells`, whose documents are of type `model`.
    pub(crate) fn new(
        db: &'db Database,
        rel: Arc<ManyToManyRel>,
        model: Arc<DocumentType>,
        cells: Vec<ReferenceCell>,
        use_cached: bool,
    ) -> Self {
        let cells = if use_cached {
            cells
        } else {
            cells.iter().map(ReferenceCell::stripped).collect()
        };
        Self {
            using: db.alias().to_string(),
            db,
            rel,
            model,
            cells,
            use_cached,
            exists_in_db_only: false,
            rows: None,
        }
    }

    /// Builds a query set honoring every read option.
    pub(crate) fn with_options(
        db: &'db Database,
        rel: Arc<ManyToManyRel>,
        model: Arc<DocumentType>,
        cells: Vec<ReferenceCell>,
        options: QueryOptions,
    ) -> M2MResult<Self> {
        let qs = Self::new(db, rel, model, cells, options.use_cached);
        if options.exists_in_db_only {
            qs.only_existing()
        } else {
            Ok(qs)
        }
    }

    /// Switches to row mode.
    #[must_use]
    pub(crate) fn as_rows(mut self, rows: RowPresentation) -> Self {
        self.rows = Some(rows);
        self
    }

    fn only_existing(mut self) -> M2MResult<Self> {
        let existing = self.db.existing_pks(&self.model, &self.ids())?;
        self.cells.retain(|cell| existing.contains(&cell.pk()));
        self.exists_in_db_only = true;
        Ok(self)
    }

    /// The number of identifiers held, dangling ones included.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if no identifier is held.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Same as [`len`](Self::len).
    pub fn count(&self) -> usize {
        self.len()
    }

    /// The held identifiers, in order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.cells.iter().map(ReferenceCell::pk).collect()
    }

    /// The type of the documents this query set resolves.
    pub const fn model(&self) -> &Arc<DocumentType> {
        &self.model
    }

    /// The relationship this query set belongs to.
    pub const fn rel(&self) -> &Arc<ManyToManyRel> {
        &self.rel
    }

    /// Whether cached copies are used.
    pub const fn is_cached(&self) -> bool {
        self.use_cached
    }

    /// Whether dangling identifiers were dropped at construction.
    pub const fn is_exists_in_db_only(&self) -> bool {
        self.exists_in_db_only
    }

    /// Whether entries are relationship rows.
    pub const fn is_row_mode(&self) -> bool {
        self.rows.is_some()
    }

    /// The database alias reads are attributed to.
    pub fn db(&self) -> &str {
        &self.using
    }

    /// Attributes subsequent reads to `alias`.
    #[must_use]
    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = alias.into();
        self
    }

    /// Query sets over a stored list are always in list order.
    #[must_use]
    pub const fn ordered(self) -> Self {
        self
    }

    /// An empty query set of the same kind.
    #[must_use]
    pub fn none(&self) -> Self {
        let mut qs = self.clone();
        qs.cells.clear();
        qs
    }

    /// Resolves the cell at `index`, loading and caching it on a miss.
    fn resolve(&mut self, index: usize) -> M2MResult<Option<Document>> {
        let Some(cell) = self.cells.get_mut(index) else {
            return Ok(None);
        };
        if let Some(doc) = cell.document() {
            return Ok(Some(doc.clone()));
        }
        match self.db.find_by_pk(&self.model, cell.pk())? {
            Some(doc) => {
                cell.cache(doc.clone());
                Ok(Some(doc))
            }
            None => {
                tracing::debug!(
                    model = %self.model.label(),
                    pk = %cell.pk(),
                    "skipping dangling reference"
                );
                Ok(None)
            }
        }
    }

    fn wrap(&self, pk: ObjectId, doc: Document) -> Entry {
        match &self.rows {
            None => Entry::Document(doc),
            Some(RowPresentation::Forward { through, host }) => Entry::Row(RelationshipRow::from_parts(
                Arc::clone(through),
                format!("{}$f${pk}", host.pk().map(|p| p.to_hex()).unwrap_or_default()),
                host.clone(),
                doc,
            )),
            Some(RowPresentation::Reverse { through, target }) => Entry::Row(RelationshipRow::from_parts(
                Arc::clone(through),
                format!("{}$r${pk}", target.pk().map(|p| p.to_hex()).unwrap_or_default()),
                doc,
                target.clone(),
            )),
        }
    }

    /// Returns the entry at `index`.
    ///
    /// `None` when the index is out of range or the referenced document no
    /// longer exists.
    pub fn get_index(&mut self, index: usize) -> M2MResult<Option<Entry>> {
        let Some(pk) = self.cells.get(index).map(ReferenceCell::pk) else {
            return Ok(None);
        };
        Ok(self.resolve(index)?.map(|doc| self.wrap(pk, doc)))
    }

    /// Resolves every entry, skipping dangling identifiers.
    pub fn entries(&mut self) -> M2MResult<Vec<Entry>> {
        let mut out = Vec::with_capacity(self.cells.len());
        for index in 0..self.cells.len() {
            if let Some(entry) = self.get_index(index)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Resolves every document, skipping dangling identifiers.
    ///
    /// Row mode is ignored: these are always the documents of the cells.
    pub fn documents(&mut self) -> M2MResult<Vec<Document>> {
        let mut out = Vec::with_capacity(self.cells.len());
        for index in 0..self.cells.len() {
            if let Some(doc) = self.resolve(index)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Narrows the snapshot to the documents matching `q` in storage.
    ///
    /// The filter always runs against the stored documents, even when cached
    /// embedded copies are available.
    pub fn filter(&self, q: &Q) -> M2MResult<Self> {
        self.narrow(q.clone())
    }

    /// Narrows the snapshot to the documents *not* matching `q` in storage.
    pub fn exclude(&self, q: &Q) -> M2MResult<Self> {
        self.narrow(!q.clone())
    }

    fn narrow(&self, q: Q) -> M2MResult<Self> {
        if self.use_cached && self.rel.embeds() {
            tracing::warn!(
                field = %self.rel.name(),
                "filtering embedded relationship against storage; cached copies are not consulted"
            );
        }
        let ids = self.ids().into_iter().map(Value::ObjectId).collect();
        let query = Q::filter("pk", Lookup::In(ids)) & q;
        let matching: HashSet<ObjectId> = self.db.filter_pks(&self.model, &query)?.into_iter().collect();

        let mut narrowed = self.clone();
        narrowed.cells.retain(|cell| matching.contains(&cell.pk()));
        Ok(narrowed)
    }

    /// Finds the entry whose identifier is `pk` by scanning the snapshot.
    ///
    /// Returns `None` when it is absent or dangling.
    pub fn get(&mut self, pk: impl Into<Related>) -> M2MResult<Option<Entry>> {
        let pk = pk.into().pk()?;
        match self.cells.iter().position(|cell| cell.pk() == pk) {
            Some(index) => self.get_index(index),
            None => Ok(None),
        }
    }

    /// Projects attributes off every resolved document.
    ///
    /// With `flat` and exactly one field each row is a bare value. Attributes
    /// a document lacks yield [`Value::Null`].
    pub fn values_list(&mut self, fields: &[&str], flat: bool) -> M2MResult<Vec<ValuesListRow>> {
        if flat && fields.len() > 1 {
            return Err(M2MError::InvalidArgument(
                "'flat' is not valid when values_list is called with more than one field.".to_string(),
            ));
        }
        let rows = self
            .documents()?
            .iter()
            .map(|doc| {
                let mut values: Vec<Value> = fields
                    .iter()
                    .map(|field| doc.get(field).unwrap_or(Value::Null))
                    .collect();
                if flat && values.len() == 1 {
                    ValuesListRow::Flat(values.remove(0))
                } else {
                    ValuesListRow::Tuple(values)
                }
            })
            .collect();
        Ok(rows)
    }
}

impl fmt::Display for M2MQuerySet<'_> {
    /// Lists the resolved entries, truncated to the configured output size.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = self.db.repr_output_size();
        let mut items: Vec<String> = Vec::new();
        for cell in &self.cells {
            if items.len() > limit {
                break;
            }
            let doc = match cell.document() {
                Some(doc) => Some(doc.clone()),
                None => self.db.find_by_pk(&self.model, cell.pk()).ok().flatten(),
            };
            if let Some(doc) = doc {
                items.push(self.wrap(cell.pk(), doc).to_string());
            }
        }
        if items.len() > limit {
            items.truncate(limit);
            items.push("...(remaining elements truncated)...".to_string());
        }
        write!(f, "[{}]", items.join(", "))
    }
}

impl fmt::Debug for M2MQuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("M2MQuerySet")
            .field("rel", &self.rel.name())
            .field("model", &self.model.label())
            .field("ids", &self.ids())
            .field("use_cached", &self.use_cached)
            .field("row_mode", &self.rows.is_some())
            .field("using", &self.using)
            .finish()
    }
}
