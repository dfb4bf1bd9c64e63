//! The resolved relationship descriptor.

use std::fmt;
use std::sync::Arc;

use crate::document::DocumentType;
use crate::related::codec::RelationCodec;
use crate::related::through::ThroughType;

/// Static metadata of one many-to-many field, created once when the field
/// is attached to its host type and shared by every manager, query set,
/// reverse accessor, and through emulator of that field.
pub struct ManyToManyRel {
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) host: Arc<DocumentType>,
    pub(crate) target: Arc<DocumentType>,
    pub(crate) related_name: String,
    pub(crate) through: Option<Arc<ThroughType>>,
    pub(crate) codec: Box<dyn RelationCodec>,
}

impl ManyToManyRel {
    /// The field name on the host type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column holding the stored list.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The type declaring the field.
    pub const fn host(&self) -> &Arc<DocumentType> {
        &self.host
    }

    /// The referenced type.
    pub const fn target(&self) -> &Arc<DocumentType> {
        &self.target
    }

    /// Whether full copies of the targets are stored.
    pub fn embeds(&self) -> bool {
        self.codec.embeds()
    }

    /// The reverse accessor name installed on the target type.
    pub fn related_name(&self) -> &str {
        &self.related_name
    }

    /// The synthetic through type. Abstract hosts have none.
    pub const fn through(&self) -> Option<&Arc<ThroughType>> {
        self.through.as_ref()
    }

    /// The storage strategy.
    pub fn codec(&self) -> &dyn RelationCodec {
        self.codec.as_ref()
    }

    /// The path of the target identifier inside the stored list.
    ///
    /// Identifier lists are matched directly; embedded copies through their
    /// primary key column.
    pub fn pk_path(&self) -> String {
        if self.embeds() {
            format!("{}.{}", self.column, self.target.pk.column)
        } else {
            self.column.clone()
        }
    }

    /// The sender name used for `m2m_changed` dispatches.
    pub fn signal_sender(&self) -> String {
        self.through.as_ref().map_or_else(
            || format!("{}.{}", self.host.label_lower(), self.name),
            |t| t.label_lower(),
        )
    }
}

impl fmt::Debug for ManyToManyRel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToManyRel")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("host", &self.host.label())
            .field("target", &self.target.label())
            .field("embed", &self.embeds())
            .field("related_name", &self.related_name)
            .field("through", &self.through.as_ref().map(|t| t.label()))
            .finish()
    }
}
