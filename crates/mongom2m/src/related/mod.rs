//! Many-to-many relationships stored as lists inside the host document.
//!
//! ## Modules
//!
//! - [`field`] - Field declarations and their resolution against the target type
//! - [`rel`] - The shared relationship descriptor
//! - [`cell`] - Reference cells and the `Related` input union
//! - [`codec`] - Storage strategies: identifiers only, or embedded copies
//! - [`manager`] - The manager bound to one host document
//! - [`queryset`] - The query-set emulator
//! - [`reverse`] - Reverse accessors from a target back to its hosts
//! - [`through`] - Synthetic relationship types and rows
//! - [`predicate`] - Filtering hosts by related-document attributes
//! - [`signals`] - The `m2m_changed` signal

pub mod cell;
pub mod codec;
pub mod field;
pub mod manager;
pub mod predicate;
pub mod queryset;
pub mod rel;
pub mod reverse;
pub mod signals;
pub mod through;

pub use cell::{ReferenceCell, Related};
pub use codec::{EmbeddedCodec, ReferenceCodec, RelationCodec};
pub use field::{ManyToManyField, RelationTarget};
pub use manager::RelatedManager;
pub use predicate::{translate, FieldQuery};
pub use queryset::{Entry, M2MQuerySet, QueryOptions, ValuesListRow};
pub use rel::ManyToManyRel;
pub use reverse::ReverseManager;
pub use signals::{M2MAction, M2MChanged, M2M_CHANGED};
pub use through::{RelationshipRow, ThroughFilter, ThroughManager, ThroughQuerySet, ThroughType};
