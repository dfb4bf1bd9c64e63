//! In-process document store.
//!
//! [`MemoryStore`] keeps each collection as an insertion-ordered list of BSON
//! records and evaluates the subset of the Mongo filter dialect that the
//! filter compiler and the relationship layer emit:
//!
//! - `$and`, `$or`, `$nor` at any nesting level
//! - dotted paths that descend through embedded documents and arrays
//! - implicit equality, which also matches array elements; `null` matches
//!   missing fields
//! - `$eq`, `$ne`, `$in`, `$nin`, `$gt`, `$gte`, `$lt`, `$lte`, `$exists`,
//!   and `$regex` with `$options`

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use bson::Bson;
use mongom2m_core::{M2MError, M2MResult};

use super::DocumentStore;

/// An in-memory [`DocumentStore`].
///
/// # Examples
///
/// ```
/// use bson::doc;
/// use bson::oid::ObjectId;
/// use mongom2m::store::{DocumentStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// let id = ObjectId::new();
/// store.save("tags", doc! { "_id": id, "name": "rust" }).unwrap();
///
/// let found = store.find("tags", &doc! { "name": { "$regex": "^ru" } }).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<bson::Document>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("store lock poisoned")
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Returns `true` if `collection` holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Removes every record of every collection.
    pub fn flush(&self) {
        self.collections.write().expect("store lock poisoned").clear();
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, filter: &bson::Document) -> M2MResult<Vec<bson::Document>> {
        let collections = self.collections.read().expect("store lock poisoned");
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for record in records {
            if matches_filter(record, filter)? {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    fn save(&self, collection: &str, record: bson::Document) -> M2MResult<()> {
        let Some(id) = record.get("_id").cloned() else {
            return Err(M2MError::DatabaseError(format!(
                "cannot save a record without _id into '{collection}'"
            )));
        };
        let mut collections = self.collections.write().expect("store lock poisoned");
        let records = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = records.iter_mut().find(|r| r.get("_id") == Some(&id)) {
            *existing = record;
        } else {
            records.push(record);
        }
        Ok(())
    }

    fn delete(&self, collection: &str, filter: &bson::Document) -> M2MResult<u64> {
        let mut collections = self.collections.write().expect("store lock poisoned");
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed = records
            .iter()
            .map(|record| matches_filter(record, filter))
            .collect::<M2MResult<Vec<bool>>>()?;
        let mut flags = doomed.iter();
        records.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }
}

/// Evaluates a filter document against one record.
pub fn matches_filter(record: &bson::Document, filter: &bson::Document) -> M2MResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches_filter(record, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_sub_filter(record, key, condition)?,
            "$nor" => !any_sub_filter(record, key, condition)?,
            op if op.starts_with('$') => {
                return Err(M2MError::QueryError(format!("unsupported operator '{op}'")));
            }
            path => {
                let candidates = values_at(record, path);
                matches_condition(&candidates, condition)?
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, condition: &'a Bson) -> M2MResult<Vec<&'a bson::Document>> {
    let Bson::Array(items) = condition else {
        return Err(M2MError::QueryError(format!("{op} expects an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            other => Err(M2MError::QueryError(format!(
                "{op} expects documents, got {other}"
            ))),
        })
        .collect()
}

fn any_sub_filter(record: &bson::Document, op: &str, condition: &Bson) -> M2MResult<bool> {
    for sub in sub_filters(op, condition)? {
        if matches_filter(record, sub)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Collects every value reachable through a dotted path.
fn values_at<'a>(record: &'a bson::Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = record.get(*head) {
            descend(value, rest, &mut out);
        }
    }
    out
}

fn descend<'a>(value: &'a Bson, path: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                descend(next, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get(i)) {
                descend(item, rest, out);
            }
            for item in items {
                if matches!(item, Bson::Document(_)) {
                    descend(item, path, out);
                }
            }
        }
        _ => {}
    }
}

/// Values and, for arrays, their elements.
fn expanded<'a>(candidates: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(candidates.len());
    for value in candidates {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn is_operator_document(condition: &Bson) -> bool {
    matches!(condition, Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')))
}

fn matches_condition(candidates: &[&Bson], condition: &Bson) -> M2MResult<bool> {
    let Bson::Document(ops) = condition else {
        return Ok(matches_eq(candidates, condition));
    };
    if !is_operator_document(condition) {
        return Ok(matches_eq(candidates, condition));
    }

    for (op, operand) in ops {
        let matched = match op.as_str() {
            "$eq" => matches_eq(candidates, operand),
            "$ne" => !matches_eq(candidates, operand),
            "$in" => matches_in(candidates, op, operand)?,
            "$nin" => !matches_in(candidates, op, operand)?,
            "$gt" => matches_cmp(candidates, operand, Ordering::is_gt),
            "$gte" => matches_cmp(candidates, operand, Ordering::is_ge),
            "$lt" => matches_cmp(candidates, operand, Ordering::is_lt),
            "$lte" => matches_cmp(candidates, operand, Ordering::is_le),
            "$exists" => candidates.is_empty() != truthy(operand),
            "$regex" => {
                let options = ops.get_str("$options").unwrap_or_default();
                matches_regex(candidates, operand, options)?
            }
            "$options" => true,
            other => {
                return Err(M2MError::QueryError(format!("unsupported operator '{other}'")));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        _ => true,
    }
}

fn matches_eq(candidates: &[&Bson], operand: &Bson) -> bool {
    if matches!(operand, Bson::Null) && candidates.is_empty() {
        return true;
    }
    expanded(candidates).iter().any(|value| bson_eq(value, operand))
}

fn matches_in(candidates: &[&Bson], op: &str, operand: &Bson) -> M2MResult<bool> {
    let Bson::Array(options) = operand else {
        return Err(M2MError::QueryError(format!("{op} expects an array")));
    };
    Ok(options.iter().any(|option| matches_eq(candidates, option)))
}

fn matches_cmp(candidates: &[&Bson], operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    expanded(candidates)
        .iter()
        .any(|value| bson_cmp(value, operand).is_some_and(accept))
}

fn matches_regex(candidates: &[&Bson], pattern: &Bson, options: &str) -> M2MResult<bool> {
    let Bson::String(pattern) = pattern else {
        return Err(M2MError::QueryError("$regex expects a string".to_string()));
    };
    let flags: String = options.chars().filter(|c| "imsx".contains(*c)).collect();
    let source = if flags.is_empty() {
        pattern.clone()
    } else {
        format!("(?{flags}){pattern}")
    };
    let re = regex::Regex::new(&source)
        .map_err(|e| M2MError::QueryError(format!("invalid regex '{pattern}': {e}")))?;
    Ok(expanded(candidates)
        .iter()
        .any(|value| matches!(value, Bson::String(s) if re.is_match(s))))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
