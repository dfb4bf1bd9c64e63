//! Many-to-many field declarations.
//!
//! A [`ManyToManyField`] is what a host type declares. It is turned into the
//! shared [`ManyToManyRel`] descriptor once its target type is known: either
//! immediately, or later when the target is registered under the label the
//! field names.

use std::fmt;
use std::sync::Arc;

use mongom2m_core::{M2MError, M2MResult};

use crate::document::DocumentType;
use crate::registry::SchemaRegistry;
use crate::related::codec::codec_for;
use crate::related::rel::ManyToManyRel;
use crate::related::through::ThroughType;

/// The type a field points to.
#[derive(Debug, Clone)]
pub enum RelationTarget {
    /// An already-built type.
    Type(Arc<DocumentType>),
    /// A lazy reference: `"app.Model"`, or `"Model"` within the host's app.
    Label(String),
}

impl From<Arc<DocumentType>> for RelationTarget {
    fn from(meta: Arc<DocumentType>) -> Self {
        Self::Type(meta)
    }
}

impl From<&Arc<DocumentType>> for RelationTarget {
    fn from(meta: &Arc<DocumentType>) -> Self {
        Self::Type(Arc::clone(meta))
    }
}

impl From<&str> for RelationTarget {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for RelationTarget {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

/// Declaration of a many-to-many field on a host type.
///
/// # Examples
///
/// ```
/// use mongom2m::related::ManyToManyField;
///
/// let field = ManyToManyField::new("categories", "testapp.TestCategory")
///     .embed(true)
///     .related_name("%(app_label)s_%(class)s_set");
/// assert_eq!(field.name(), "categories");
/// assert!(field.is_embedded());
/// ```
#[derive(Clone)]
pub struct ManyToManyField {
    name: String,
    to: RelationTarget,
    related_name: Option<String>,
    embed: bool,
    db_column: Option<String>,
}

impl ManyToManyField {
    /// Declares a field named `name` pointing at `to`.
    pub fn new(name: impl Into<String>, to: impl Into<RelationTarget>) -> Self {
        Self {
            name: name.into(),
            to: to.into(),
            related_name: None,
            embed: false,
            db_column: None,
        }
    }

    /// Sets the reverse accessor name.
    ///
    /// `%(app_label)s` and `%(class)s` are replaced by the host's app label
    /// and lowercased type name.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Stores full copies of the targets instead of bare identifiers.
    #[must_use]
    pub const fn embed(mut self, embed: bool) -> Self {
        self.embed = embed;
        self
    }

    /// Stores the list under `column` instead of the field name.
    #[must_use]
    pub fn db_column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether targets are embedded.
    pub const fn is_embedded(&self) -> bool {
        self.embed
    }

    /// The registry key of the target, relative to `host`.
    pub fn target_label(&self, host: &DocumentType) -> String {
        match &self.to {
            RelationTarget::Type(meta) => meta.label_lower(),
            RelationTarget::Label(label) if label.contains('.') => label.to_lowercase(),
            RelationTarget::Label(label) => format!("{}.{}", host.app_label, label.to_lowercase()),
        }
    }

    /// The target type when it was given directly.
    pub const fn target_type(&self) -> Option<&Arc<DocumentType>> {
        match &self.to {
            RelationTarget::Type(meta) => Some(meta),
            RelationTarget::Label(_) => None,
        }
    }

    fn resolved_related_name(&self, host: &DocumentType) -> String {
        self.related_name.as_ref().map_or_else(
            || format!("{}_set", host.model_name),
            |name| {
                name.replace("%(app_label)s", &host.app_label)
                    .replace("%(class)s", &host.model_name)
            },
        )
    }

    /// Resolves the field against its now-known target.
    ///
    /// Builds the descriptor and, for concrete hosts, the synthetic through
    /// type. The descriptor is installed first, so a clash leaves `registry`
    /// unchanged; the through type is registered once it is accepted.
    pub fn contribute(
        self,
        host: &Arc<DocumentType>,
        target: &Arc<DocumentType>,
        registry: &mut dyn SchemaRegistry,
    ) -> M2MResult<Arc<ManyToManyRel>> {
        if self.name.is_empty() {
            return Err(M2MError::ImproperlyConfigured(format!(
                "{}: many-to-many field needs a name",
                host.label()
            )));
        }

        let through = if host.abstract_model {
            None
        } else {
            Some(Arc::new(ThroughType::new(host, target, &self.name)))
        };

        let rel = Arc::new(ManyToManyRel {
            related_name: self.resolved_related_name(host),
            column: self.db_column.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            host: Arc::clone(host),
            target: Arc::clone(target),
            through,
            codec: codec_for(target, self.embed),
        });
        registry.install_relation(Arc::clone(&rel))?;
        if let Some(through) = &rel.through {
            registry.register_through(Arc::clone(through))?;
        }

        tracing::debug!(
            host = %host.label(),
            field = %rel.name,
            target = %target.label(),
            embed = self.embed,
            related_name = %rel.related_name,
            "many-to-many field resolved"
        );
        Ok(rel)
    }
}

impl fmt::Debug for ManyToManyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let to = match &self.to {
            RelationTarget::Type(meta) => meta.label(),
            RelationTarget::Label(label) => label.clone(),
        };
        f.debug_struct("ManyToManyField")
            .field("name", &self.name)
            .field("to", &to)
            .field("embed", &self.embed)
            .field("related_name", &self.related_name)
            .finish_non_exhaustive()
    }
}
