//! Storage strategies for relationship fields.
//!
//! A relationship field stores its cells as one list-valued column. The
//! [`RelationCodec`] strategy decides what each element looks like:
//! [`ReferenceCodec`] writes bare identifiers, [`EmbeddedCodec`] writes a
//! copy of the target's fields. The strategy is picked once, when the field
//! is configured.
//!
//! Decoding is shared and permissive. Every shape a deployed
//! collection may still contain is accepted:
//!
//! 1. an `ObjectId`
//! 2. the 24-character hex form of an id
//! 3. a construction tuple, stored either as a map tagged with `_model` or as
//!    a two-element `[type, values]` array; a tuple whose values hold only an
//!    `id` is a leftover from an id-only field and decodes as an id
//! 4. a raw field map keyed by target columns; a map that yields only the
//!    primary key decodes as an id
//! 5. a 12-byte binary id
//!
//! Anything else is skipped with a warning. Decoding never fails.

use std::fmt;
use std::sync::Arc;

use bson::spec::BinarySubtype;
use bson::Bson;
use mongom2m_core::M2MResult;

use crate::database::Database;
use crate::document::{Document, DocumentType};
use crate::related::cell::ReferenceCell;
use crate::value::{coerce_object_id, parse_object_id, Value};

/// Key marking a stored map as a construction tuple.
pub const MODEL_TAG: &str = "_model";

/// The encode / decode / default strategy of a relationship field.
pub trait RelationCodec: Send + Sync + fmt::Debug {
    /// Whether elements carry full copies of the targets.
    fn embeds(&self) -> bool;

    /// Serializes the cells into the stored column value.
    ///
    /// Embedding codecs may load uncached targets through `db` and cache them
    /// in the cells.
    fn encode(&self, cells: &mut [ReferenceCell], db: &Database) -> M2MResult<Bson>;

    /// Rebuilds cells from a stored column value.
    fn decode(&self, stored: &Bson) -> Vec<ReferenceCell>;

    /// The cells of a field that has never been assigned.
    fn default_value(&self) -> Vec<ReferenceCell> {
        Vec::new()
    }
}

/// Returns the codec matching the `embed` option.
pub fn codec_for(target: &Arc<DocumentType>, embed: bool) -> Box<dyn RelationCodec> {
    if embed {
        Box::new(EmbeddedCodec::new(target))
    } else {
        Box::new(ReferenceCodec::new(target))
    }
}

/// Stores each related document as its bare identifier.
#[derive(Debug, Clone)]
pub struct ReferenceCodec {
    target: Arc<DocumentType>,
}

impl ReferenceCodec {
    /// Creates the codec for `target`.
    pub fn new(target: &Arc<DocumentType>) -> Self {
        Self {
            target: Arc::clone(target),
        }
    }
}

impl RelationCodec for ReferenceCodec {
    fn embeds(&self) -> bool {
        false
    }

    fn encode(&self, cells: &mut [ReferenceCell], _db: &Database) -> M2MResult<Bson> {
        Ok(Bson::Array(
            cells.iter().map(|cell| Bson::ObjectId(cell.pk())).collect(),
        ))
    }

    fn decode(&self, stored: &Bson) -> Vec<ReferenceCell> {
        decode_list(stored, &self.target, false)
    }
}

/// Stores a copy of each related document's fields.
#[derive(Debug, Clone)]
pub struct EmbeddedCodec {
    target: Arc<DocumentType>,
}

impl EmbeddedCodec {
    /// Creates the codec for `target`.
    pub fn new(target: &Arc<DocumentType>) -> Self {
        Self {
            target: Arc::clone(target),
        }
    }
}

impl RelationCodec for EmbeddedCodec {
    fn embeds(&self) -> bool {
        true
    }

    fn encode(&self, cells: &mut [ReferenceCell], db: &Database) -> M2MResult<Bson> {
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells.iter_mut() {
            if !cell.is_loaded() {
                match db.find_by_pk(&self.target, cell.pk())? {
                    Some(doc) => cell.cache(doc),
                    None => {
                        tracing::warn!(
                            target_type = %self.target.label(),
                            pk = %cell.pk(),
                            "related document no longer exists; storing its id only"
                        );
                        out.push(Bson::ObjectId(cell.pk()));
                        continue;
                    }
                }
            }
            if let Some(doc) = cell.document() {
                out.push(Bson::Document(doc.to_record()));
            }
        }
        Ok(Bson::Array(out))
    }

    fn decode(&self, stored: &Bson) -> Vec<ReferenceCell> {
        decode_list(stored, &self.target, true)
    }
}

fn decode_list(stored: &Bson, target: &Arc<DocumentType>, embed: bool) -> Vec<ReferenceCell> {
    match stored {
        Bson::Null | Bson::Undefined => Vec::new(),
        Bson::Array(items) if !is_tuple_pair(items) => items
            .iter()
            .filter_map(|item| decode_element(item, target, embed))
            .collect(),
        // A single element stored without its list
        single => decode_element(single, target, embed).into_iter().collect(),
    }
}

/// `[type, values]` stored as the whole column, as opposed to a list whose
/// first element happens to be a hex id.
fn is_tuple_pair(items: &[Bson]) -> bool {
    matches!(items, [Bson::String(name), Bson::Document(_)] if parse_object_id(name).is_err())
}

/// Normalizes one stored element into a cell.
pub fn decode_element(element: &Bson, target: &Arc<DocumentType>, embed: bool) -> Option<ReferenceCell> {
    let cell = match element {
        Bson::ObjectId(oid) => Some(ReferenceCell::id_only(*oid)),
        Bson::String(s) => parse_object_id(s).ok().map(ReferenceCell::id_only),
        Bson::Document(map) if map.contains_key(MODEL_TAG) => {
            let mut values = map.clone();
            values.remove(MODEL_TAG);
            decode_tuple(values, target)
        }
        Bson::Array(items) => match items.as_slice() {
            [Bson::String(_), Bson::Document(values)] => decode_tuple(values.clone(), target),
            _ => None,
        },
        Bson::Document(map) => decode_field_map(map, target, embed),
        Bson::Binary(bin) if bin.subtype == BinarySubtype::Generic => {
            coerce_object_id(&Value::Bytes(bin.bytes.clone()))
                .ok()
                .map(ReferenceCell::id_only)
        }
        _ => None,
    };
    if cell.is_none() {
        tracing::warn!(
            target_type = %target.label(),
            element = %element,
            "skipping undecodable relationship element"
        );
    }
    cell
}

fn decode_tuple(values: bson::Document, target: &Arc<DocumentType>) -> Option<ReferenceCell> {
    let only_id = values.len() == 1 && values.contains_key(&target.pk.attname);
    if only_id && target.fields.len() > 1 {
        return pk_of(&values, &target.pk.attname).map(ReferenceCell::id_only);
    }
    let doc = Document::from_values(
        target,
        values.into_iter().map(|(k, v)| (k, Value::from(v))),
    )
    .ok()?;
    ReferenceCell::with_document(doc).ok()
}

fn decode_field_map(map: &bson::Document, target: &Arc<DocumentType>, embed: bool) -> Option<ReferenceCell> {
    let pk_column = &target.pk.column;
    if !embed {
        return pk_of(map, pk_column).map(ReferenceCell::id_only);
    }

    let known = target
        .fields
        .iter()
        .filter(|f| map.contains_key(&f.column))
        .count();
    if known <= 1 {
        return pk_of(map, pk_column).map(ReferenceCell::id_only);
    }

    let data = target
        .fields
        .iter()
        .filter_map(|f| map.get(&f.column).map(|v| (f.attname.as_str(), Value::from(v.clone()))));
    let doc = Document::from_values(target, data).ok()?;
    ReferenceCell::with_document(doc).ok()
}

fn pk_of(map: &bson::Document, key: &str) -> Option<bson::oid::ObjectId> {
    map.get(key)
        .and_then(|v| coerce_object_id(&Value::from(v.clone())).ok())
}
