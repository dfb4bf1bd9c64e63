//! The database handle.
//!
//! [`Database`] ties a [`DocumentStore`] to a [`SchemaRegistry`] and plays
//! the part of the host framework's objects manager: fetching, filtering,
//! saving, and deleting documents of a registered type. Saving and loading go
//! through every relationship field's codec, so the cells of a [`Document`]
//! are written into, and read back from, the host's own record.
//!
//! It is also the entry point to the relationship core:
//!
//! - [`related`](Database::related) binds a manager to a host document
//! - [`reverse`](Database::reverse) follows a reverse accessor from a target
//! - [`through`](Database::through) opens a synthetic relationship type
//! - [`field_query`](Database::field_query) filters hosts by related attributes

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;
use mongom2m_core::{M2MError, M2MResult, Settings, SETTINGS};

use crate::document::{Document, DocumentType};
use crate::query::compiler::FilterCompiler;
use crate::query::lookups::{Lookup, Q};
use crate::registry::SchemaRegistry;
use crate::related::manager::RelatedManager;
use crate::related::predicate::FieldQuery;
use crate::related::rel::ManyToManyRel;
use crate::related::reverse::ReverseManager;
use crate::related::through::ThroughManager;
use crate::store::DocumentStore;
use crate::value::{coerce_object_id, Value};

/// The default database alias.
pub const DEFAULT_DB_ALIAS: &str = "default";

/// A document store together with the schema describing its collections.
#[derive(Clone)]
pub struct Database {
    alias: String,
    store: Arc<dyn DocumentStore>,
    registry: Arc<dyn SchemaRegistry>,
    repr_output_size: usize,
}

impl Database {
    /// Creates a handle under the default alias.
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            alias: DEFAULT_DB_ALIAS.to_string(),
            store,
            registry,
            repr_output_size: 20,
        }
    }

    /// Creates a handle for the settings' default database.
    ///
    /// Fails with `ConfigurationError` if that alias has no database entry.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn DocumentStore>,
        registry: Arc<dyn SchemaRegistry>,
    ) -> M2MResult<Self> {
        let Some(db_settings) = settings.default_database_settings() else {
            return Err(M2MError::ConfigurationError(format!(
                "no database configured for alias '{}'",
                settings.default_database
            )));
        };
        tracing::debug!(
            alias = %settings.default_database,
            engine = %db_settings.engine,
            name = %db_settings.name,
            "database configured"
        );
        Ok(Self {
            alias: settings.default_database.clone(),
            store,
            registry,
            repr_output_size: settings.repr_output_size,
        })
    }

    /// Creates a handle from the globally configured settings.
    pub fn from_global_settings(
        store: Arc<dyn DocumentStore>,
        registry: Arc<dyn SchemaRegistry>,
    ) -> M2MResult<Self> {
        let settings = SETTINGS.try_get().ok_or_else(|| {
            M2MError::ConfigurationError("settings are not configured".to_string())
        })?;
        Self::from_settings(settings, store, registry)
    }

    /// Renames the handle's alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// The alias reported in signals and query sets.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// How many entries a formatted query set shows.
    pub const fn repr_output_size(&self) -> usize {
        self.repr_output_size
    }

    /// The storage driver.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// The schema registry.
    pub fn registry(&self) -> &dyn SchemaRegistry {
        self.registry.as_ref()
    }

    /// Looks up a registered document type.
    pub fn document_type(&self, label: &str) -> M2MResult<Arc<DocumentType>> {
        self.registry
            .document_type(label)
            .ok_or_else(|| M2MError::ImproperlyConfigured(format!("unknown document type '{label}'")))
    }

    /// Looks up a relationship field of `host`.
    pub fn relation(&self, host: &DocumentType, field: &str) -> M2MResult<Arc<ManyToManyRel>> {
        self.registry.relation(&host.label_lower(), field).ok_or_else(|| {
            M2MError::InvalidArgument(format!(
                "{} has no many-to-many field named '{field}'",
                host.object_name
            ))
        })
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Loads the document with primary key `pk`, if stored.
    pub fn find_by_pk(&self, meta: &Arc<DocumentType>, pk: ObjectId) -> M2MResult<Option<Document>> {
        let mut filter = bson::Document::new();
        filter.insert(meta.pk.column.clone(), pk);
        self.store
            .find_one(&meta.db_table, &filter)?
            .map(|record| self.load(meta, record))
            .transpose()
    }

    /// Loads the document with primary key `pk` or fails with `DoesNotExist`.
    pub fn get_by_pk(&self, meta: &Arc<DocumentType>, pk: ObjectId) -> M2MResult<Document> {
        self.find_by_pk(meta, pk)?
            .ok_or_else(|| does_not_exist(meta))
    }

    /// The single document matching `q`.
    pub fn get(&self, meta: &Arc<DocumentType>, q: &Q) -> M2MResult<Document> {
        let mut found = self.filter(meta, q)?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(does_not_exist(meta)),
            n => Err(M2MError::MultipleObjectsReturned(format!(
                "get() returned more than one {} -- it returned {n}!",
                meta.object_name
            ))),
        }
    }

    /// Every document matching `q`, in storage order.
    pub fn filter(&self, meta: &Arc<DocumentType>, q: &Q) -> M2MResult<Vec<Document>> {
        self.raw_query(meta, &FilterCompiler::for_type(meta).compile(q))
    }

    /// Every document *not* matching `q`.
    pub fn exclude(&self, meta: &Arc<DocumentType>, q: &Q) -> M2MResult<Vec<Document>> {
        self.filter(meta, &!q.clone())
    }

    /// Every stored document of the type.
    pub fn all(&self, meta: &Arc<DocumentType>) -> M2MResult<Vec<Document>> {
        self.raw_query(meta, &bson::Document::new())
    }

    /// The number of documents matching `q`.
    pub fn count(&self, meta: &Arc<DocumentType>, q: &Q) -> M2MResult<usize> {
        self.store
            .count(&meta.db_table, &FilterCompiler::for_type(meta).compile(q))
    }

    /// The primary keys of the documents matching `q`, without loading them.
    pub fn filter_pks(&self, meta: &Arc<DocumentType>, q: &Q) -> M2MResult<Vec<ObjectId>> {
        let records = self
            .store
            .find(&meta.db_table, &FilterCompiler::for_type(meta).compile(q))?;
        Ok(records
            .iter()
            .filter_map(|record| record.get(&meta.pk.column))
            .filter_map(|pk| coerce_object_id(&Value::from(pk.clone())).ok())
            .collect())
    }

    /// The subset of `ids` that is still stored.
    pub fn existing_pks(&self, meta: &Arc<DocumentType>, ids: &[ObjectId]) -> M2MResult<HashSet<ObjectId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let values = ids.iter().copied().map(Value::ObjectId).collect();
        Ok(self
            .filter_pks(meta, &Q::filter("pk", Lookup::In(values)))?
            .into_iter()
            .collect())
    }

    /// Runs a filter document as is against the type's collection.
    pub fn raw_query(&self, meta: &Arc<DocumentType>, filter: &bson::Document) -> M2MResult<Vec<Document>> {
        self.store
            .find(&meta.db_table, filter)?
            .into_iter()
            .map(|record| self.load(meta, record))
            .collect()
    }

    /// Builds a document from a stored record, decoding its relationship
    /// columns into cells.
    pub fn load(&self, meta: &Arc<DocumentType>, mut record: bson::Document) -> M2MResult<Document> {
        let rels = self.registry.relations_of(&meta.label_lower());
        let mut decoded = Vec::with_capacity(rels.len());
        for rel in &rels {
            let cells = match record.remove(rel.column()) {
                Some(stored) => rel.codec().decode(&stored),
                None => rel.codec().default_value(),
            };
            decoded.push((rel.name().to_string(), cells));
        }

        let mut doc = Document::from_record(meta, record)?;
        for (name, cells) in decoded {
            doc.set_cells(&name, cells);
        }
        Ok(doc)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Inserts or replaces `doc`, assigning a primary key on first save.
    ///
    /// Every relationship field is encoded into the record. Embedding fields
    /// may load uncached targets while doing so.
    pub fn save(&self, doc: &mut Document) -> M2MResult<()> {
        let meta = Arc::clone(doc.meta());
        if meta.abstract_model {
            return Err(M2MError::ImproperlyConfigured(format!(
                "abstract type {} cannot be saved",
                meta.object_name
            )));
        }
        let created = doc.pk().is_none();
        if created {
            doc.set_pk(ObjectId::new());
        }

        let mut record = doc.to_record();
        for rel in self.registry.relations_of(&meta.label_lower()) {
            let encoded = rel.codec().encode(doc.cells_mut(rel.name()), self)?;
            record.insert(rel.column(), encoded);
        }
        self.store.save(&meta.db_table, record)?;

        tracing::debug!(
            table = %meta.db_table,
            pk = %doc.pk().map(|pk| pk.to_hex()).unwrap_or_default(),
            created,
            "document saved"
        );
        Ok(())
    }

    /// Deletes `doc` from storage. Returns `false` if it was not stored.
    ///
    /// References to it held by other documents are left in place.
    pub fn delete(&self, doc: &Document) -> M2MResult<bool> {
        let meta = doc.meta();
        let pk = doc.require_pk()?;
        let mut filter = bson::Document::new();
        filter.insert(meta.pk.column.clone(), pk);
        let removed = self.store.delete(&meta.db_table, &filter)?;
        tracing::debug!(table = %meta.db_table, pk = %pk, removed, "document deleted");
        Ok(removed > 0)
    }

    // ── Relationships ────────────────────────────────────────────────

    /// Binds the manager of `host.<field>`.
    pub fn related<'a>(&'a self, host: &'a mut Document, field: &str) -> M2MResult<RelatedManager<'a>> {
        let rel = self.relation(host.meta(), field)?;
        Ok(RelatedManager::new(self, rel, host))
    }

    /// Follows the reverse accessor `accessor` from `target` to its hosts.
    pub fn reverse(&self, target: &Document, accessor: &str) -> M2MResult<ReverseManager<'_>> {
        let rel = self
            .registry
            .reverse_relation(&target.meta().label_lower(), accessor)
            .ok_or_else(|| {
                M2MError::InvalidArgument(format!(
                    "{} has no reverse accessor named '{accessor}'",
                    target.meta().object_name
                ))
            })?;
        Ok(ReverseManager::new(self, rel, target.clone()))
    }

    /// Opens the synthetic relationship type registered under `label`.
    pub fn through(&self, label: &str) -> M2MResult<ThroughManager<'_>> {
        let through = self.registry.through(label).ok_or_else(|| {
            M2MError::ImproperlyConfigured(format!("unknown relationship type '{label}'"))
        })?;
        let rel = self.relation(&through.host, &through.field_name)?;
        Ok(ThroughManager::new(self, rel, through))
    }

    /// Host-level queries on `host.<field>`.
    pub fn field_query(&self, host: &DocumentType, field: &str) -> M2MResult<FieldQuery<'_>> {
        Ok(FieldQuery::new(self, self.relation(host, field)?))
    }
}

fn does_not_exist(meta: &DocumentType) -> M2MError {
    M2MError::DoesNotExist(format!("{} matching query does not exist.", meta.object_name))
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("alias", &self.alias)
            .field("repr_output_size", &self.repr_output_size)
            .finish_non_exhaustive()
    }
}
