//! The schema registry.
//!
//! Document types, their many-to-many fields, the synthetic through types,
//! and the reverse accessors installed on target types are all recorded in a
//! [`SchemaRegistry`]. The relationship core only talks to the trait, so an
//! embedding framework can hand in its own model registry; [`Registry`] is
//! the in-process implementation.
//!
//! Fields may name their target by label before the target is registered.
//! Such fields stay pending and are resolved when the target type arrives.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use mongom2m_core::{M2MError, M2MResult};

use crate::document::DocumentType;
use crate::related::field::ManyToManyField;
use crate::related::rel::ManyToManyRel;
use crate::related::through::ThroughType;

/// Registration and lookup of types and relationships.
///
/// Labels are `"app_label.ModelName"`, compared case-insensitively.
pub trait SchemaRegistry: Send + Sync {
    /// Registers a document type and resolves the fields waiting for it.
    fn register_type(&mut self, meta: DocumentType) -> M2MResult<Arc<DocumentType>>;

    /// Declares a many-to-many field on an already registered host type.
    fn register_field(&mut self, host_label: &str, field: ManyToManyField) -> M2MResult<()>;

    /// Records the synthetic through type of a relationship.
    fn register_through(&mut self, through: Arc<ThroughType>) -> M2MResult<()>;

    /// Records a resolved relationship and installs its reverse accessor.
    ///
    /// Fails without recording anything when the accessor or the name of the
    /// relationship's through type is already taken. The through type itself
    /// is recorded afterwards with [`register_through`](Self::register_through).
    fn install_relation(&mut self, rel: Arc<ManyToManyRel>) -> M2MResult<()>;

    /// Looks up a document type.
    fn document_type(&self, label: &str) -> Option<Arc<DocumentType>>;

    /// Looks up a resolved field of a host type.
    fn relation(&self, host_label: &str, field: &str) -> Option<Arc<ManyToManyRel>>;

    /// Every resolved field of a host type, in declaration order.
    fn relations_of(&self, host_label: &str) -> Vec<Arc<ManyToManyRel>>;

    /// Looks up the relationship behind a reverse accessor of a target type.
    fn reverse_relation(&self, target_label: &str, accessor: &str) -> Option<Arc<ManyToManyRel>>;

    /// Looks up a synthetic through type.
    fn through(&self, label: &str) -> Option<Arc<ThroughType>>;

    /// Describes the fields still waiting for their target type.
    fn pending_relations(&self) -> Vec<String>;
}

/// In-process [`SchemaRegistry`].
///
/// # Examples
///
/// ```
/// use mongom2m::document::DocumentType;
/// use mongom2m::registry::{Registry, SchemaRegistry};
/// use mongom2m::related::ManyToManyField;
///
/// let mut registry = Registry::new();
/// registry.register_type(DocumentType::new("blog", "Article")).unwrap();
/// registry
///     .register_field("blog.Article", ManyToManyField::new("tags", "Tag"))
///     .unwrap();
/// assert_eq!(registry.pending_relations(), vec!["blog.article.tags -> blog.tag"]);
///
/// registry.register_type(DocumentType::new("blog", "Tag")).unwrap();
/// assert!(registry.pending_relations().is_empty());
/// assert!(registry.reverse_relation("blog.tag", "article_set").is_some());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<String, Arc<DocumentType>>,
    relations: HashMap<String, Vec<Arc<ManyToManyRel>>>,
    reverse: HashMap<(String, String), Arc<ManyToManyRel>>,
    throughs: HashMap<String, Arc<ThroughType>>,
    pending: Vec<(Arc<DocumentType>, String, ManyToManyField)>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of registered document types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    fn check_through(&self, through: &ThroughType) -> M2MResult<()> {
        let label = through.label_lower();
        if self.throughs.contains_key(&label) || self.types.contains_key(&label) {
            return Err(M2MError::ImproperlyConfigured(format!(
                "relationship type '{}' clashes with an existing type",
                through.label()
            )));
        }
        Ok(())
    }

    fn has_field(&self, host_label: &str, name: &str) -> bool {
        let resolved = self
            .relations
            .get(host_label)
            .is_some_and(|rels| rels.iter().any(|rel| rel.name() == name));
        let pending = self
            .pending
            .iter()
            .any(|(host, _, field)| host.label_lower() == host_label && field.name() == name);
        resolved || pending
    }
}

impl SchemaRegistry for Registry {
    fn register_type(&mut self, meta: DocumentType) -> M2MResult<Arc<DocumentType>> {
        let label = meta.label_lower();
        if self.types.contains_key(&label) || self.throughs.contains_key(&label) {
            return Err(M2MError::ImproperlyConfigured(format!(
                "document type '{}' is already registered",
                meta.label()
            )));
        }
        let meta = Arc::new(meta);
        self.types.insert(label.clone(), Arc::clone(&meta));
        tracing::debug!(label = %meta.label(), table = %meta.db_table, "document type registered");

        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, target, _)| *target == label);
        self.pending = waiting;
        for (host, _, field) in ready {
            field.contribute(&host, &meta, self)?;
        }
        Ok(meta)
    }

    fn register_field(&mut self, host_label: &str, field: ManyToManyField) -> M2MResult<()> {
        let host_label = host_label.to_lowercase();
        let host = self.types.get(&host_label).cloned().ok_or_else(|| {
            M2MError::ImproperlyConfigured(format!(
                "cannot add field '{}' to unregistered type '{host_label}'",
                field.name()
            ))
        })?;
        if self.has_field(&host_label, field.name()) {
            return Err(M2MError::ImproperlyConfigured(format!(
                "{} already has a field named '{}'",
                host.label(),
                field.name()
            )));
        }

        let target = match field.target_type() {
            Some(target) => Some(Arc::clone(target)),
            None => self.types.get(&field.target_label(&host)).cloned(),
        };
        match target {
            Some(target) => {
                field.contribute(&host, &target, self)?;
            }
            None => {
                let target_label = field.target_label(&host);
                tracing::debug!(
                    host = %host.label(),
                    field = %field.name(),
                    target = %target_label,
                    "target type not registered yet; field pending"
                );
                self.pending.push((host, target_label, field));
            }
        }
        Ok(())
    }

    fn register_through(&mut self, through: Arc<ThroughType>) -> M2MResult<()> {
        self.check_through(&through)?;
        self.throughs.insert(through.label_lower(), through);
        Ok(())
    }

    fn install_relation(&mut self, rel: Arc<ManyToManyRel>) -> M2MResult<()> {
        if let Some(through) = rel.through() {
            self.check_through(through)?;
        }
        if !rel.host().abstract_model {
            let key = (rel.target().label_lower(), rel.related_name().to_string());
            if let Some(existing) = self.reverse.get(&key) {
                return Err(M2MError::ImproperlyConfigured(format!(
                    "reverse accessor '{}' for {}.{} clashes with {}.{}",
                    rel.related_name(),
                    rel.host().object_name,
                    rel.name(),
                    existing.host().object_name,
                    existing.name()
                )));
            }
            self.reverse.insert(key, Arc::clone(&rel));
        }
        self.relations
            .entry(rel.host().label_lower())
            .or_default()
            .push(rel);
        Ok(())
    }

    fn document_type(&self, label: &str) -> Option<Arc<DocumentType>> {
        self.types.get(&label.to_lowercase()).cloned()
    }

    fn relation(&self, host_label: &str, field: &str) -> Option<Arc<ManyToManyRel>> {
        self.relations
            .get(&host_label.to_lowercase())?
            .iter()
            .find(|rel| rel.name() == field)
            .cloned()
    }

    fn relations_of(&self, host_label: &str) -> Vec<Arc<ManyToManyRel>> {
        self.relations
            .get(&host_label.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn reverse_relation(&self, target_label: &str, accessor: &str) -> Option<Arc<ManyToManyRel>> {
        self.reverse
            .get(&(target_label.to_lowercase(), accessor.to_string()))
            .cloned()
    }

    fn through(&self, label: &str) -> Option<Arc<ThroughType>> {
        self.throughs.get(&label.to_lowercase()).cloned()
    }

    fn pending_relations(&self) -> Vec<String> {
        self.pending
            .iter()
            .map(|(host, target, field)| format!("{}.{} -> {target}", host.label_lower(), field.name()))
            .collect()
    }
}
