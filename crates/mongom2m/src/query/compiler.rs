//! Compiles [`Q`] trees into Mongo-style filter documents.
//!
//! The compiler is the document-store counterpart of a SQL `WHERE` builder:
//! each [`Lookup`] becomes an operator document on a (possibly dotted) path and
//! the boolean nodes become `$and` / `$or` / `$nor`. Attribute names are mapped
//! to storage columns through the [`DocumentType`] when one is supplied; `pk`
//! always maps to the primary key column.

use bson::{doc, Bson};

use crate::document::DocumentType;
use crate::query::lookups::{Lookup, Q};
use crate::value::{parse_object_id, Value};

/// Translates host-side filters into the storage driver's filter documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCompiler<'m> {
    meta: Option<&'m DocumentType>,
}

impl<'m> FilterCompiler<'m> {
    /// A compiler that passes field names through unchanged.
    pub const fn new() -> Self {
        Self { meta: None }
    }

    /// A compiler that maps attribute names to the columns of `meta`.
    pub const fn for_type(meta: &'m DocumentType) -> Self {
        Self { meta: Some(meta) }
    }

    /// Compiles a filter tree into a filter document.
    ///
    /// An empty `AND` matches everything; an empty `OR` matches nothing.
    pub fn compile(&self, q: &Q) -> bson::Document {
        match q {
            Q::Filter { field, lookup } => {
                let (path, is_pk) = self.resolve_path(field);
                let mut filter = bson::Document::new();
                filter.insert(path, Self::compile_lookup(lookup, is_pk));
                filter
            }
            Q::And(children) => match children.as_slice() {
                [] => bson::Document::new(),
                [only] => self.compile(only),
                _ => doc! { "$and": self.compile_all(children) },
            },
            Q::Or(children) => match children.as_slice() {
                [] => doc! { "_id": { "$in": [] } },
                [only] => self.compile(only),
                _ => doc! { "$or": self.compile_all(children) },
            },
            Q::Not(inner) => doc! { "$nor": [self.compile(inner)] },
        }
    }

    fn compile_all(&self, children: &[Q]) -> Vec<Bson> {
        children
            .iter()
            .map(|child| Bson::Document(self.compile(child)))
            .collect()
    }

    /// Maps the first segment of `field` to its storage column.
    fn resolve_path(&self, field: &str) -> (String, bool) {
        let (head, rest) = field
            .split_once('.')
            .map_or((field, None), |(head, rest)| (head, Some(rest)));

        let pk_column = self.meta.map_or("_id", |m| m.pk.column.as_str());
        let (column, is_pk) = if head == "pk" {
            (pk_column.to_string(), true)
        } else if let Some(def) = self.meta.and_then(|m| m.field(head)) {
            (def.column.clone(), def.column == pk_column)
        } else {
            (head.to_string(), head == pk_column)
        };

        match rest {
            Some(rest) => (format!("{column}.{rest}"), false),
            None => (column, is_pk),
        }
    }

    fn compile_lookup(lookup: &Lookup, is_pk: bool) -> Bson {
        let operand = |v: &Value| -> Bson {
            if is_pk {
                if let Value::String(s) = v {
                    if let Ok(oid) = parse_object_id(s) {
                        return Bson::ObjectId(oid);
                    }
                }
            }
            Bson::from(v.clone())
        };

        match lookup {
            Lookup::Exact(v) => operand(v),
            Lookup::IExact(v) => {
                let text = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                regex_operand(&format!("^{}$", regex::escape(&text)), true)
            }
            Lookup::Contains(s) => regex_operand(&regex::escape(s), false),
            Lookup::IContains(s) => regex_operand(&regex::escape(s), true),
            Lookup::StartsWith(s) => regex_operand(&format!("^{}", regex::escape(s)), false),
            Lookup::IStartsWith(s) => regex_operand(&format!("^{}", regex::escape(s)), true),
            Lookup::EndsWith(s) => regex_operand(&format!("{}$", regex::escape(s)), false),
            Lookup::IEndsWith(s) => regex_operand(&format!("{}$", regex::escape(s)), true),
            Lookup::Regex(pattern) => regex_operand(pattern, false),
            Lookup::IRegex(pattern) => regex_operand(pattern, true),
            Lookup::In(values) => {
                let values: Vec<Bson> = values.iter().map(operand).collect();
                Bson::Document(doc! { "$in": values })
            }
            Lookup::Gt(v) => Bson::Document(doc! { "$gt": operand(v) }),
            Lookup::Gte(v) => Bson::Document(doc! { "$gte": operand(v) }),
            Lookup::Lt(v) => Bson::Document(doc! { "$lt": operand(v) }),
            Lookup::Lte(v) => Bson::Document(doc! { "$lte": operand(v) }),
            Lookup::Range(lo, hi) => Bson::Document(doc! { "$gte": operand(lo), "$lte": operand(hi) }),
            Lookup::IsNull(true) => Bson::Null,
            Lookup::IsNull(false) => Bson::Document(doc! { "$ne": Bson::Null }),
        }
    }
}

fn regex_operand(pattern: &str, case_insensitive: bool) -> Bson {
    let mut operand = doc! { "$regex": pattern };
    if case_insensitive {
        operand.insert("$options", "i");
    }
    Bson::Document(operand)
}

/// Compiles `q` without column mapping.
pub fn compile_filter(q: &Q) -> bson::Document {
    FilterCompiler::new().compile(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    fn tag_type() -> DocumentType {
        DocumentType::new("testapp", "TestTag")
            .with_field("name")
            .with_field_column("slug", "s")
    }

    #[test]
    fn test_exact_on_plain_field() {
        let filter = compile_filter(&Q::eq("name", "rust"));
        assert_eq!(filter, doc! { "name": "rust" });
    }

    #[test]
    fn test_pk_maps_to_id_column_and_coerces() {
        let oid = ObjectId::new();
        let filter = compile_filter(&Q::eq("pk", oid.to_hex()));
        assert_eq!(filter, doc! { "_id": oid });
    }

    #[test]
    fn test_attname_maps_to_column() {
        let meta = tag_type();
        let filter = FilterCompiler::for_type(&meta).compile(&Q::eq("slug", "r"));
        assert_eq!(filter, doc! { "s": "r" });
    }

    #[test]
    fn test_dotted_path_passes_through() {
        let oid = ObjectId::new();
        let filter = compile_filter(&Q::eq("tags._id", oid));
        assert_eq!(filter, doc! { "tags._id": oid });
    }

    #[test]
    fn test_in_lookup() {
        let q = Q::filter("pk", Lookup::In(vec![Value::from("x"), Value::Int(2)]));
        assert_eq!(compile_filter(&q), doc! { "_id": { "$in": ["x", 2_i64] } });
    }

    #[test]
    fn test_icontains_escapes_pattern() {
        let q = Q::filter("name", Lookup::IContains("a.b".into()));
        assert_eq!(
            compile_filter(&q),
            doc! { "name": { "$regex": "a\\.b", "$options": "i" } }
        );
    }

    #[test]
    fn test_range_and_isnull() {
        let q = Q::filter("age", Lookup::Range(Value::Int(1), Value::Int(5)));
        assert_eq!(compile_filter(&q), doc! { "age": { "$gte": 1_i64, "$lte": 5_i64 } });

        let q = Q::filter("age", Lookup::IsNull(false));
        assert_eq!(compile_filter(&q), doc! { "age": { "$ne": Bson::Null } });
    }

    #[test]
    fn test_boolean_nodes() {
        let q = (Q::eq("a", 1) | Q::eq("b", 2)) & !Q::eq("c", 3);
        assert_eq!(
            compile_filter(&q),
            doc! {
                "$and": [
                    { "$or": [ { "a": 1_i64 }, { "b": 2_i64 } ] },
                    { "$nor": [ { "c": 3_i64 } ] },
                ]
            }
        );
    }

    #[test]
    fn test_empty_nodes() {
        assert_eq!(compile_filter(&Q::And(vec![])), bson::Document::new());
        assert_eq!(compile_filter(&Q::Or(vec![])), doc! { "_id": { "$in": [] } });
    }
}
