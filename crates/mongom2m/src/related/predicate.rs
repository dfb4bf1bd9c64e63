//! Filtering hosts by the attributes of their related documents.
//!
//! A filter such as `Q::eq("name", "rust")` written against the target type
//! of `Article.tags` has to become `Q::eq("tags.name", "rust")` before it can
//! run on the article collection. [`translate`] performs that rewrite on
//! every leaf of a filter tree. Identifier lookups are rewritten to the path
//! where the identifier actually lives and their operands are coerced to
//! `ObjectId`s.
//!
//! A relationship that only stores identifiers has nothing else to match
//! against, so any other attribute is rejected with a `QueryError`.

use std::fmt;
use std::sync::Arc;

use mongom2m_core::{M2MError, M2MResult};

use crate::database::Database;
use crate::document::Document;
use crate::query::lookups::{Lookup, Q};
use crate::related::rel::ManyToManyRel;
use crate::value::{coerce_object_id, Value};

/// Rewrites a filter on the target type into a filter on the host type.
pub fn translate(q: &Q, rel: &ManyToManyRel) -> M2MResult<Q> {
    match q {
        Q::Filter { field, lookup } => translate_leaf(q, field, lookup, rel),
        Q::And(children) => Ok(Q::And(translate_all(children, rel)?)),
        Q::Or(children) => Ok(Q::Or(translate_all(children, rel)?)),
        Q::Not(inner) => Ok(Q::Not(Box::new(translate(inner, rel)?))),
    }
}

fn translate_all(children: &[Q], rel: &ManyToManyRel) -> M2MResult<Vec<Q>> {
    children.iter().map(|child| translate(child, rel)).collect()
}

fn translate_leaf(q: &Q, field: &str, lookup: &Lookup, rel: &ManyToManyRel) -> M2MResult<Q> {
    let target = rel.target();
    let (head, rest) = field
        .split_once('.')
        .map_or((field, None), |(head, rest)| (head, Some(rest)));

    if target.is_pk_name(head) && rest.is_none() {
        let lookup = lookup.clone().try_map_values(|v| coerce_pk_operand(v, q))?;
        return Ok(Q::filter(rel.pk_path(), lookup));
    }

    if !rel.embeds() {
        return Err(M2MError::QueryError(format!(
            "cannot filter '{}' by {q}: only the primary key can be queried on a relationship \
             that does not embed its documents. Enable embedding and re-save the hosts to \
             query other attributes.",
            rel.name()
        )));
    }

    let column = target.field(head).map_or(head, |f| f.column.as_str());
    let path = match rest {
        Some(rest) => format!("{}.{column}.{rest}", rel.column()),
        None => format!("{}.{column}", rel.column()),
    };
    Ok(Q::filter(path, lookup.clone()))
}

fn coerce_pk_operand(value: Value, q: &Q) -> M2MResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(items) => items
            .into_iter()
            .map(|item| coerce_pk_operand(item, q))
            .collect::<M2MResult<Vec<_>>>()
            .map(Value::List),
        other => coerce_object_id(&other)
            .map(Value::ObjectId)
            .map_err(|_| M2MError::QueryError(format!("invalid identifier {other} in {q}"))),
    }
}

/// Host-level queries on one relationship field.
///
/// Obtained from [`Database::field_query`].
#[derive(Clone)]
pub struct FieldQuery<'db> {
    db: &'db Database,
    rel: Arc<ManyToManyRel>,
}

impl<'db> FieldQuery<'db> {
    pub(crate) fn new(db: &'db Database, rel: Arc<ManyToManyRel>) -> Self {
        Self { db, rel }
    }

    /// The relationship being queried.
    pub const fn rel(&self) -> &Arc<ManyToManyRel> {
        &self.rel
    }

    /// Hosts with at least one related document matching `q`.
    pub fn filter(&self, q: &Q) -> M2MResult<Vec<Document>> {
        self.db.filter(self.rel.host(), &translate(q, &self.rel)?)
    }

    /// Hosts with no related document matching `q`.
    pub fn exclude(&self, q: &Q) -> M2MResult<Vec<Document>> {
        self.db.exclude(self.rel.host(), &translate(q, &self.rel)?)
    }

    /// The single host matching `q`.
    pub fn get(&self, q: &Q) -> M2MResult<Document> {
        self.db.get(self.rel.host(), &translate(q, &self.rel)?)
    }

    /// The number of hosts matching `q`.
    pub fn count(&self, q: &Q) -> M2MResult<usize> {
        self.db.count(self.rel.host(), &translate(q, &self.rel)?)
    }
}

impl fmt::Debug for FieldQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldQuery").field("rel", &self.rel).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;
    use crate::registry::{Registry, SchemaRegistry};
    use crate::related::field::ManyToManyField;
    use bson::oid::ObjectId;

    fn rel(embed: bool) -> Arc<ManyToManyRel> {
        let mut registry = Registry::new();
        let host = registry
            .register_type(DocumentType::new("predapp", "Article").with_field("title"))
            .unwrap();
        let target = registry
            .register_type(DocumentType::new("predapp", "Tag").with_field_column("name", "n"))
            .unwrap();
        ManyToManyField::new("tags", &target)
            .embed(embed)
            .contribute(&host, &target, &mut registry)
            .unwrap()
    }

    #[test]
    fn test_pk_lookup_is_coerced() {
        let oid = ObjectId::new();
        let q = translate(&Q::eq("pk", oid.to_hex()), &rel(false)).unwrap();
        assert_eq!(q, Q::eq("tags", Value::ObjectId(oid)));

        let q = translate(&Q::eq("id", oid.to_hex()), &rel(true)).unwrap();
        assert_eq!(q, Q::eq("tags._id", Value::ObjectId(oid)));
    }

    #[test]
    fn test_pk_in_and_null_operands() {
        let oid = ObjectId::new();
        let q = translate(
            &Q::filter("pk", Lookup::In(vec![Value::from(oid.to_hex()), Value::Null])),
            &rel(false),
        )
        .unwrap();
        assert_eq!(
            q,
            Q::filter("tags", Lookup::In(vec![Value::ObjectId(oid), Value::Null]))
        );
    }

    #[test]
    fn test_invalid_pk_operand_is_query_error() {
        let err = translate(&Q::eq("pk", "nope"), &rel(false)).unwrap_err();
        assert!(matches!(err, M2MError::QueryError(_)));
    }

    #[test]
    fn test_attribute_requires_embedding() {
        let err = translate(&Q::eq("name", "rust"), &rel(false)).unwrap_err();
        match err {
            M2MError::QueryError(msg) => {
                assert!(msg.contains("name=rust"));
                assert!(msg.contains("'tags'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_attribute_maps_to_embedded_column() {
        let q = Q::eq("name", "rust") | !Q::eq("extra.depth", 2);
        let translated = translate(&q, &rel(true)).unwrap();
        assert_eq!(
            translated,
            Q::eq("tags.n", "rust") | !Q::eq("tags.extra.depth", 2)
        );
    }
}
