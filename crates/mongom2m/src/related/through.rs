//! The relationship-table emulator.
//!
//! Tooling written for relational schemas expects every many-to-many field
//! to have an intermediate "through" table. A document store has none, so
//! each concrete relationship gets a synthetic [`ThroughType`] and a
//! [`ThroughManager`] that supports the filter-then-operate pattern only:
//!
//! - `filter(Host(h))` opens the rows of host `h`
//! - `filter(Target(t))` opens the rows referencing `t`
//! - `get("<id>$<f|r>$<id>")` fetches one row by its composite key
//!
//! Rows are never stored. Saving or deleting a [`RelationshipRow`] becomes an
//! `add` or `remove` on the host's manager followed by a save of the host.

use std::fmt;
use std::sync::Arc;

use mongom2m_core::{M2MError, M2MResult};

use crate::database::Database;
use crate::document::{Document, DocumentType};
use crate::related::queryset::{Entry, M2MQuerySet, RowPresentation};
use crate::related::rel::ManyToManyRel;
use crate::related::reverse::ReverseManager;
use crate::value::parse_object_id;

/// Separator of the composite row key.
pub const KEY_SEPARATOR: char = '$';

/// Metadata of the synthetic intermediate type of one relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughType {
    /// The host's app label.
    pub app_label: String,
    /// `<Host><Target>Relationship`.
    pub object_name: String,
    /// The lowercased object name.
    pub model_name: String,
    /// `<app_label>_<model_name>`.
    pub db_table: String,
    /// `"<host> <target> relationship"`.
    pub verbose_name: String,
    /// `"<host> <target> relationships"`.
    pub verbose_name_plural: String,
    /// The host type.
    pub host: Arc<DocumentType>,
    /// The target type.
    pub target: Arc<DocumentType>,
    /// The relationship field on the host.
    pub field_name: String,
}

impl ThroughType {
    /// Derives the through metadata of `host.<field_name>` pointing at `target`.
    pub fn new(host: &Arc<DocumentType>, target: &Arc<DocumentType>, field_name: &str) -> Self {
        let object_name = format!("{}{}Relationship", host.object_name, target.object_name);
        let model_name = object_name.to_lowercase();
        Self {
            app_label: host.app_label.clone(),
            db_table: format!("{}_{model_name}", host.app_label),
            verbose_name: format!("{} {} relationship", host.verbose_name, target.verbose_name),
            verbose_name_plural: format!("{} {} relationships", host.verbose_name, target.verbose_name),
            object_name,
            model_name,
            host: Arc::clone(host),
            target: Arc::clone(target),
            field_name: field_name.to_string(),
        }
    }

    /// `"<app_label>.<ObjectName>"`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.object_name)
    }

    /// `"<app_label>.<model_name>"`, the registry key.
    pub fn label_lower(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// The attribute naming the host side of a row.
    pub fn host_attr(&self) -> &str {
        &self.host.model_name
    }

    /// The attribute naming the target side of a row.
    pub fn target_attr(&self) -> &str {
        &self.target.model_name
    }
}

/// The direction encoded in a row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Opened from the host: `"<host-id>$f$<target-id>"`.
    Forward,
    /// Opened from the target: `"<target-id>$r$<host-id>"`.
    Reverse,
}

impl Direction {
    const fn tag(self) -> &'static str {
        match self {
            Self::Forward => "f",
            Self::Reverse => "r",
        }
    }
}

/// A parsed composite row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowKey {
    /// The direction the row was opened from.
    pub direction: Direction,
    /// The host identifier.
    pub host: bson::oid::ObjectId,
    /// The target identifier.
    pub target: bson::oid::ObjectId,
}

impl RowKey {
    /// Parses `"<a>$<dir>$<b>"`. Returns `None` for anything else.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, KEY_SEPARATOR);
        let first = parse_object_id(parts.next()?).ok()?;
        let direction = match parts.next()? {
            "f" => Direction::Forward,
            "r" => Direction::Reverse,
            _ => return None,
        };
        let second = parse_object_id(parts.next()?).ok()?;
        Some(match direction {
            Direction::Forward => Self {
                direction,
                host: first,
                target: second,
            },
            Direction::Reverse => Self {
                direction,
                host: second,
                target: first,
            },
        })
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, second) = match self.direction {
            Direction::Forward => (self.host, self.target),
            Direction::Reverse => (self.target, self.host),
        };
        write!(
            f,
            "{first}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{second}",
            self.direction.tag()
        )
    }
}

/// A fabricated join-table row: "`host` is related to `target`".
#[derive(Debug, Clone)]
pub struct RelationshipRow {
    through: Arc<ThroughType>,
    pk: String,
    host: Document,
    target: Document,
}

impl RelationshipRow {
    /// A new forward row, as tooling builds one before saving it.
    pub fn new(through: &Arc<ThroughType>, host: Document, target: Document) -> M2MResult<Self> {
        let key = RowKey {
            direction: Direction::Forward,
            host: host.require_pk()?,
            target: target.require_pk()?,
        };
        Ok(Self::from_parts(Arc::clone(through), key.to_string(), host, target))
    }

    pub(crate) const fn from_parts(through: Arc<ThroughType>, pk: String, host: Document, target: Document) -> Self {
        Self {
            through,
            pk,
            host,
            target,
        }
    }

    /// The composite key.
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// The parsed composite key.
    pub fn key(&self) -> Option<RowKey> {
        RowKey::parse(&self.pk)
    }

    /// The synthetic type of this row.
    pub const fn through(&self) -> &Arc<ThroughType> {
        &self.through
    }

    /// The host side.
    pub const fn host(&self) -> &Document {
        &self.host
    }

    /// The target side.
    pub const fn target(&self) -> &Document {
        &self.target
    }

    /// Consumes the row, returning the target side.
    pub fn into_target(self) -> Document {
        self.target
    }

    /// Returns the side named `attr` (the lowercased host or target type name).
    pub fn side(&self, attr: &str) -> Option<&Document> {
        if attr == self.through.host_attr() {
            Some(&self.host)
        } else if attr == self.through.target_attr() {
            Some(&self.target)
        } else {
            None
        }
    }

    /// Records the relationship: adds the target to the host's field and
    /// saves the host. The row itself is never stored.
    pub fn save(&mut self, db: &Database) -> M2MResult<()> {
        let field = self.through.field_name.clone();
        db.related(&mut self.host, &field)?
            .add([self.target.clone()], false)?;
        db.save(&mut self.host)
    }

    /// Removes the relationship from the host's field and saves the host.
    pub fn delete(&mut self, db: &Database) -> M2MResult<()> {
        let field = self.through.field_name.clone();
        db.related(&mut self.host, &field)?
            .remove([self.target.clone()], false)?;
        db.save(&mut self.host)
    }
}

impl fmt::Display for RelationshipRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.host, self.target)
    }
}

/// The instance a through query is bound to.
#[derive(Debug, Clone, Copy)]
pub enum ThroughFilter<'a> {
    /// Rows of this host document.
    Host(&'a Document),
    /// Rows referencing this target document.
    Target(&'a Document),
}

/// The objects manager of a synthetic through type.
#[derive(Debug, Clone)]
pub struct ThroughManager<'db> {
    db: &'db Database,
    rel: Arc<ManyToManyRel>,
    through: Arc<ThroughType>,
}

impl<'db> ThroughManager<'db> {
    pub(crate) fn new(db: &'db Database, rel: Arc<ManyToManyRel>, through: Arc<ThroughType>) -> Self {
        Self { db, rel, through }
    }

    /// The synthetic type.
    pub const fn through(&self) -> &Arc<ThroughType> {
        &self.through
    }

    /// An unbound query set. Only `filter` and `get` make sense on it.
    pub fn all(&self) -> ThroughQuerySet<'db> {
        ThroughQuerySet {
            manager: self.clone(),
            using: self.db.alias().to_string(),
        }
    }

    /// Opens the rows of a host or of a target, in row mode.
    pub fn filter(&self, by: ThroughFilter<'_>) -> M2MResult<M2MQuerySet<'db>> {
        match by {
            ThroughFilter::Host(host) => {
                self.check_type(host, &self.through.host)?;
                let cells = host.cells(self.rel.name()).to_vec();
                let qs = M2MQuerySet::new(self.db, Arc::clone(&self.rel), Arc::clone(self.rel.target()), cells, true);
                Ok(qs.as_rows(RowPresentation::Forward {
                    through: Arc::clone(&self.through),
                    host: host.clone(),
                }))
            }
            ThroughFilter::Target(target) => {
                self.check_type(target, &self.through.target)?;
                ReverseManager::new(self.db, Arc::clone(&self.rel), target.clone()).relationship_queryset()
            }
        }
    }

    fn check_type(&self, doc: &Document, expected: &DocumentType) -> M2MResult<()> {
        if doc.meta().label_lower() == expected.label_lower() {
            Ok(())
        } else {
            Err(M2MError::InvalidArgument(format!(
                "{} cannot be filtered by a {} instance",
                self.through.object_name,
                doc.meta().object_name
            )))
        }
    }

    /// Fetches one row by its composite key.
    ///
    /// Fails with `DoesNotExist` when the key is malformed, when either side
    /// is missing, or when the two are not related. Only the requested row
    /// is resolved.
    pub fn get(&self, pk: &str) -> M2MResult<RelationshipRow> {
        let Some(key) = RowKey::parse(pk) else {
            return Err(self.does_not_exist());
        };

        let (mut qs, wanted) = match key.direction {
            Direction::Forward => {
                let host = self.db.get_by_pk(&self.through.host, key.host)?;
                (self.filter(ThroughFilter::Host(&host))?, key.target)
            }
            Direction::Reverse => {
                let target = self.db.get_by_pk(&self.through.target, key.target)?;
                (self.filter(ThroughFilter::Target(&target))?, key.host)
            }
        };

        match qs.get(wanted)? {
            Some(Entry::Row(row)) => Ok(row),
            Some(Entry::Document(_)) | None => Err(self.does_not_exist()),
        }
    }

    fn does_not_exist(&self) -> M2MError {
        M2MError::DoesNotExist(format!(
            "{} matching query does not exist.",
            self.through.object_name
        ))
    }
}

/// The unbound query set of a through manager.
///
/// Listing every relationship of a field is not supported: length and
/// indexing fail with `UnboundQuery` until the query is bound with `filter`.
#[derive(Debug, Clone)]
pub struct ThroughQuerySet<'db> {
    manager: ThroughManager<'db>,
    using: String,
}

impl<'db> ThroughQuerySet<'db> {
    /// Binds the query to a host or target.
    pub fn filter(&self, by: ThroughFilter<'_>) -> M2MResult<M2MQuerySet<'db>> {
        Ok(self.manager.filter(by)?.using(self.using.clone()))
    }

    /// See [`ThroughManager::get`].
    pub fn get(&self, pk: &str) -> M2MResult<RelationshipRow> {
        self.manager.get(pk)
    }

    /// Always `false`: an unbound query holds no rows.
    pub const fn exists(&self) -> bool {
        false
    }

    /// Fails with `UnboundQuery`.
    pub fn len(&self) -> M2MResult<usize> {
        Err(M2MError::UnboundQuery(format!(
            "{} rows must be accessed through filter() (len)",
            self.manager.through.object_name
        )))
    }

    /// Fails with `UnboundQuery`.
    pub fn get_index(&self, index: usize) -> M2MResult<RelationshipRow> {
        Err(M2MError::UnboundQuery(format!(
            "{} rows must be accessed through filter() (index {index})",
            self.manager.through.object_name
        )))
    }

    /// Attributes subsequent reads to `alias`.
    #[must_use]
    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = alias.into();
        self
    }

    /// The database alias reads are attributed to.
    pub fn db(&self) -> &str {
        &self.using
    }

    /// No-op.
    #[must_use]
    pub const fn ordered(self) -> Self {
        self
    }

    /// An unbound query is already empty.
    #[must_use]
    pub const fn none(self) -> Self {
        self
    }
}
