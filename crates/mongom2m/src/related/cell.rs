//! Reference cells and the `Related` input union.

use std::fmt;

use bson::oid::ObjectId;
use mongom2m_core::{M2MError, M2MResult};

use crate::document::Document;
use crate::value::{coerce_object_id, parse_object_id, Value};

/// The unit of relationship state: an identifier plus an optional cached copy
/// of the referenced document.
///
/// The cached document, when present, always carries the cell's identifier.
#[derive(Debug, Clone)]
pub struct ReferenceCell {
    pk: ObjectId,
    obj: Option<Document>,
}

impl ReferenceCell {
    /// A cell holding only an identifier.
    pub const fn id_only(pk: ObjectId) -> Self {
        Self { pk, obj: None }
    }

    /// A cell caching `doc`. Fails when the document has no primary key.
    pub fn with_document(doc: Document) -> M2MResult<Self> {
        let pk = doc.require_pk()?;
        Ok(Self { pk, obj: Some(doc) })
    }

    /// The referenced identifier.
    pub const fn pk(&self) -> ObjectId {
        self.pk
    }

    /// The cached document, if loaded.
    pub const fn document(&self) -> Option<&Document> {
        self.obj.as_ref()
    }

    /// Returns `true` if a copy of the target is cached.
    pub const fn is_loaded(&self) -> bool {
        self.obj.is_some()
    }

    /// Caches a loaded copy of the target.
    pub(crate) fn cache(&mut self, doc: Document) {
        debug_assert_eq!(doc.pk(), Some(self.pk));
        self.obj = Some(doc);
    }

    /// Drops the cached copy, keeping the identifier.
    #[must_use]
    pub const fn stripped(&self) -> Self {
        Self::id_only(self.pk)
    }
}

/// Something that designates a related document: its identifier or the
/// document itself.
#[derive(Debug, Clone)]
pub enum Related {
    /// A bare identifier.
    Id(ObjectId),
    /// A document instance. It must have been saved.
    Document(Document),
}

impl Related {
    /// Parses the hex form of an identifier.
    pub fn parse(s: &str) -> M2MResult<Self> {
        parse_object_id(s).map(Self::Id)
    }

    /// Builds a `Related` from an identifier-shaped value.
    pub fn from_value(value: &Value) -> M2MResult<Self> {
        coerce_object_id(value).map(Self::Id)
    }

    /// The designated identifier.
    pub fn pk(&self) -> M2MResult<ObjectId> {
        match self {
            Self::Id(pk) => Ok(*pk),
            Self::Document(doc) => doc.require_pk(),
        }
    }

    /// Turns this input into a reference cell, keeping a document as cache.
    pub fn into_cell(self) -> M2MResult<ReferenceCell> {
        match self {
            Self::Id(pk) => Ok(ReferenceCell::id_only(pk)),
            Self::Document(doc) => ReferenceCell::with_document(doc),
        }
    }
}

impl From<ObjectId> for Related {
    fn from(pk: ObjectId) -> Self {
        Self::Id(pk)
    }
}

impl From<Document> for Related {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

impl From<&Document> for Related {
    fn from(doc: &Document) -> Self {
        Self::Document(doc.clone())
    }
}

impl TryFrom<&str> for Related {
    type Error = M2MError;

    fn try_from(s: &str) -> M2MResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(pk) => write!(f, "{pk}"),
            Self::Document(doc) => write!(f, "{doc}"),
        }
    }
}
