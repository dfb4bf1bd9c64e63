//! # mongom2m
//!
//! Many-to-many relationships for document stores. A relationship field is
//! stored as a list inside the host document, either as bare identifiers or as
//! embedded copies of the related documents, and is presented to calling code
//! the way a relational ORM presents a join table: a manager with
//! `add` / `remove` / `clear`, lazily resolved query sets, reverse accessors,
//! `m2m_changed` signals, and a synthetic "through" type for tooling that
//! expects one.
//!
//! ## Architecture
//!
//! The relationship state of one host document is an ordered list of
//! [`ReferenceCell`](related::ReferenceCell)s: an identifier plus an optional
//! cached copy of the target. A [`RelatedManager`](related::RelatedManager)
//! mutates the list, a [`M2MQuerySet`](related::M2MQuerySet) reads it, and the
//! field's [`RelationCodec`](related::RelationCodec) turns it into the stored
//! column and back when the host is saved or loaded.
//!
//! ## Module Overview
//!
//! - [`value`] - The attribute [`Value`](value::Value) enum and identifier coercion
//! - [`document`] - Document types and instances
//! - [`query`] - Filter predicates and their compilation to filter documents
//! - [`store`] - The storage driver interface and the in-memory store
//! - [`registry`] - The schema registry
//! - [`database`] - The database handle and entry point to relationships
//! - [`related`] - Relationship fields, managers, and emulators

// - result_large_err: M2MError is the crate-wide error type and is used consistently
// - needless_pass_by_value: manager inputs mirror the host framework's API
// - doc_markdown: backtick requirements for documentation items are too strict
#![allow(clippy::result_large_err)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]

pub mod database;
pub mod document;
pub mod query;
pub mod registry;
pub mod related;
pub mod store;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use database::Database;
pub use document::{Document, DocumentType, FieldDef};
pub use query::{Lookup, Q};
pub use registry::{Registry, SchemaRegistry};
pub use related::{
    Entry, FieldQuery, M2MAction, M2MChanged, M2MQuerySet, ManyToManyField, QueryOptions,
    Related, RelatedManager, RelationshipRow, ReverseManager, ThroughFilter, ThroughManager,
    M2M_CHANGED,
};
pub use store::{DocumentStore, MemoryStore};
pub use value::Value;

pub use mongom2m_core::{M2MError, M2MResult};
