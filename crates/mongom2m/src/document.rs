//! Document types and instances.
//!
//! [`DocumentType`] is the metadata of one collection (the equivalent of a
//! model's `class Meta`): labels, table name, verbose names, and the
//! attribute-to-column mapping of its plain fields. [`Document`] is one
//! instance: an optional primary key, plain attribute values, and the reference
//! cells of every many-to-many field declared on its type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::Bson;
use mongom2m_core::{M2MError, M2MResult};

use crate::related::cell::ReferenceCell;
use crate::value::{coerce_object_id, Value};

/// The primary key attribute name.
pub const PK_ATTNAME: &str = "id";

/// The primary key storage column.
pub const PK_COLUMN: &str = "_id";

/// A plain (non-relationship) field of a document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// The attribute name used in Rust code and in filters.
    pub attname: String,
    /// The key under which the value is stored.
    pub column: String,
}

impl FieldDef {
    /// Creates a field whose column equals its attribute name.
    pub fn new(attname: impl Into<String>) -> Self {
        let attname = attname.into();
        Self {
            column: attname.clone(),
            attname,
        }
    }

    /// Creates a field stored under a different column name.
    pub fn with_column(attname: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            attname: attname.into(),
            column: column.into(),
        }
    }
}

/// Metadata describing one document type.
///
/// # Examples
///
/// ```
/// use mongom2m::document::DocumentType;
///
/// let meta = DocumentType::new("testapp", "TestArticle").with_field("title");
/// assert_eq!(meta.model_name, "testarticle");
/// assert_eq!(meta.db_table, "testapp_testarticle");
/// assert_eq!(meta.verbose_name, "test article");
/// assert_eq!(meta.label_lower(), "testapp.testarticle");
/// assert_eq!(meta.fields.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentType {
    /// The application label.
    pub app_label: String,
    /// The type name as declared (`TestArticle`).
    pub object_name: String,
    /// The lowercased type name (`testarticle`).
    pub model_name: String,
    /// The collection name.
    pub db_table: String,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Human-readable plural name.
    pub verbose_name_plural: String,
    /// Abstract types are never stored and get no synthetic through type.
    pub abstract_model: bool,
    /// The primary key field.
    pub pk: FieldDef,
    /// All plain fields, primary key first.
    pub fields: Vec<FieldDef>,
}

impl DocumentType {
    /// Creates metadata with the default table name and verbose names.
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        let app_label = app_label.into();
        let object_name = object_name.into();
        let model_name = object_name.to_lowercase();
        let verbose_name = camel_case_to_spaces(&object_name);
        let pk = FieldDef::with_column(PK_ATTNAME, PK_COLUMN);
        Self {
            db_table: format!("{app_label}_{model_name}"),
            verbose_name_plural: format!("{verbose_name}s"),
            verbose_name,
            app_label,
            object_name,
            model_name,
            abstract_model: false,
            fields: vec![pk.clone()],
            pk,
        }
    }

    /// Adds a plain field stored under its own name.
    #[must_use]
    pub fn with_field(mut self, attname: impl Into<String>) -> Self {
        self.fields.push(FieldDef::new(attname));
        self
    }

    /// Adds a plain field stored under `column`.
    #[must_use]
    pub fn with_field_column(mut self, attname: impl Into<String>, column: impl Into<String>) -> Self {
        self.fields.push(FieldDef::with_column(attname, column));
        self
    }

    /// Overrides the collection name.
    #[must_use]
    pub fn with_db_table(mut self, db_table: impl Into<String>) -> Self {
        self.db_table = db_table.into();
        self
    }

    /// Overrides both verbose names.
    #[must_use]
    pub fn with_verbose_name(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.verbose_name = singular.into();
        self.verbose_name_plural = plural.into();
        self
    }

    /// Marks the type abstract.
    #[must_use]
    pub const fn as_abstract(mut self) -> Self {
        self.abstract_model = true;
        self
    }

    /// `"<app_label>.<ObjectName>"`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.object_name)
    }

    /// `"<app_label>.<model_name>"`, the registry key.
    pub fn label_lower(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Looks up a field by attribute name. `pk` resolves to the primary key.
    pub fn field(&self, attname: &str) -> Option<&FieldDef> {
        if attname == "pk" {
            return Some(&self.pk);
        }
        self.fields.iter().find(|f| f.attname == attname)
    }

    /// Looks up a field by storage column.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Returns `true` if `name` designates the primary key.
    pub fn is_pk_name(&self, name: &str) -> bool {
        name == "pk" || name == self.pk.attname || name == self.pk.column
    }
}

/// `TestArticle` -> `test article`.
fn camel_case_to_spaces(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push(' ');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// One document instance.
///
/// Two documents are equal when they have the same type and the same primary
/// key; unsaved documents never compare equal.
#[derive(Debug, Clone)]
pub struct Document {
    meta: Arc<DocumentType>,
    pk: Option<ObjectId>,
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, Vec<ReferenceCell>>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.pk.is_some()
            && self.pk == other.pk
            && self.meta.label_lower() == other.meta.label_lower()
    }
}

impl Document {
    /// Creates an unsaved, empty document of the given type.
    pub fn new(meta: &Arc<DocumentType>) -> Self {
        Self {
            meta: Arc::clone(meta),
            pk: None,
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Builds a document from attribute/value pairs.
    ///
    /// Primary key names (`pk`, `id`, `_id`) are coerced into the identifier;
    /// other keys may be attribute names or storage columns.
    pub fn from_values<K, V>(meta: &Arc<DocumentType>, values: impl IntoIterator<Item = (K, V)>) -> M2MResult<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut doc = Self::new(meta);
        for (key, value) in values {
            doc.set(key.as_ref(), value)?;
        }
        Ok(doc)
    }

    /// Builds a document from a stored record.
    ///
    /// Columns declared on the type are mapped back to attribute names; any
    /// other key is kept under its own name.
    pub fn from_record(meta: &Arc<DocumentType>, record: bson::Document) -> M2MResult<Self> {
        let mut doc = Self::new(meta);
        for (key, value) in record {
            if key == meta.pk.column {
                doc.pk = match value {
                    Bson::Null => None,
                    other => Some(coerce_object_id(&Value::from(other))?),
                };
                continue;
            }
            let attname = meta
                .field_by_column(&key)
                .map_or(key, |f| f.attname.clone());
            doc.values.insert(attname, Value::from(value));
        }
        Ok(doc)
    }

    /// Serializes the primary key and plain attributes.
    ///
    /// Relationship fields are not included; they are encoded by their codec.
    pub fn to_record(&self) -> bson::Document {
        let mut record = bson::Document::new();
        if let Some(pk) = self.pk {
            record.insert(self.meta.pk.column.clone(), pk);
        }
        for (attname, value) in &self.values {
            let column = self
                .meta
                .field(attname)
                .map_or(attname.as_str(), |f| f.column.as_str());
            record.insert(column.to_string(), Bson::from(value.clone()));
        }
        record
    }

    /// Adds an attribute value. Use [`with_pk`](Self::with_pk) for the identifier.
    #[must_use]
    pub fn with(mut self, attname: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attname.into(), value.into());
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub const fn with_pk(mut self, pk: ObjectId) -> Self {
        self.pk = Some(pk);
        self
    }

    /// Sets an attribute, routing primary key names to the identifier.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> M2MResult<()> {
        let value = value.into();
        if self.meta.is_pk_name(name) {
            self.pk = if value.is_null() {
                None
            } else {
                Some(coerce_object_id(&value)?)
            };
            return Ok(());
        }
        let attname = self
            .meta
            .field_by_column(name)
            .map_or_else(|| name.to_string(), |f| f.attname.clone());
        self.values.insert(attname, value);
        Ok(())
    }

    /// Returns an attribute value, including `pk` / `id`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if self.meta.is_pk_name(name) {
            return self.pk.map(Value::ObjectId);
        }
        self.values.get(name).cloned()
    }

    /// The primary key, if the document has been saved.
    pub const fn pk(&self) -> Option<ObjectId> {
        self.pk
    }

    /// The primary key, or `UnsavedInstance`.
    pub fn require_pk(&self) -> M2MResult<ObjectId> {
        self.pk.ok_or_else(|| {
            M2MError::UnsavedInstance(format!(
                "{} instance needs a primary key before it can be used in a relationship",
                self.meta.object_name
            ))
        })
    }

    pub(crate) fn set_pk(&mut self, pk: ObjectId) {
        self.pk = Some(pk);
    }

    /// The type metadata.
    pub const fn meta(&self) -> &Arc<DocumentType> {
        &self.meta
    }

    /// The plain attribute values keyed by attribute name.
    pub const fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// The reference cells held for a relationship field.
    pub fn cells(&self, field: &str) -> &[ReferenceCell] {
        self.relations.get(field).map_or(&[][..], Vec::as_slice)
    }

    pub(crate) fn cells_mut(&mut self, field: &str) -> &mut Vec<ReferenceCell> {
        self.relations.entry(field.to_string()).or_default()
    }

    pub(crate) fn set_cells(&mut self, field: &str, cells: Vec<ReferenceCell>) {
        self.relations.insert(field.to_string(), cells);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pk {
            Some(pk) => write!(f, "{} object ({pk})", self.meta.object_name),
            None => write!(f, "{} object (None)", self.meta.object_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_type() -> Arc<DocumentType> {
        Arc::new(
            DocumentType::new("testapp", "TestTag")
                .with_field("name")
                .with_field_column("slug", "s"),
        )
    }

    #[test]
    fn test_type_defaults() {
        let meta = tag_type();
        assert_eq!(meta.label(), "testapp.TestTag");
        assert_eq!(meta.verbose_name_plural, "test tags");
        assert_eq!(meta.pk.column, "_id");
        assert_eq!(meta.field("pk").unwrap().attname, "id");
        assert_eq!(meta.field_by_column("s").unwrap().attname, "slug");
        assert!(!meta.abstract_model);
    }

    #[test]
    fn test_record_round_trip_maps_columns() {
        let meta = tag_type();
        let oid = ObjectId::new();
        let doc = Document::new(&meta)
            .with_pk(oid)
            .with("name", "rust")
            .with("slug", "r");

        let record = doc.to_record();
        assert_eq!(record.get_object_id("_id").unwrap(), oid);
        assert_eq!(record.get_str("s").unwrap(), "r");

        let back = Document::from_record(&meta, record).unwrap();
        assert_eq!(back.pk(), Some(oid));
        assert_eq!(back.get("slug"), Some(Value::from("r")));
        assert_eq!(back.values(), doc.values());
    }

    #[test]
    fn test_set_routes_pk_names() {
        let meta = tag_type();
        let oid = ObjectId::new();
        let mut doc = Document::new(&meta);
        doc.set("id", oid.to_hex()).unwrap();
        assert_eq!(doc.pk(), Some(oid));
        assert_eq!(doc.get("pk"), Some(Value::ObjectId(oid)));
        assert!(doc.set("pk", "garbage").is_err());
    }

    #[test]
    fn test_equality_is_type_and_pk() {
        let meta = tag_type();
        let oid = ObjectId::new();
        let a = Document::new(&meta).with_pk(oid).with("name", "a");
        let b = Document::new(&meta).with_pk(oid).with("name", "b");
        assert_eq!(a, b);
        assert_ne!(Document::new(&meta), Document::new(&meta));
    }

    #[test]
    fn test_require_pk() {
        let meta = tag_type();
        let err = Document::new(&meta).require_pk().unwrap_err();
        assert!(matches!(err, M2MError::UnsavedInstance(_)));
    }

    #[test]
    fn test_display() {
        let meta = tag_type();
        assert_eq!(Document::new(&meta).to_string(), "TestTag object (None)");
    }
}
