use crate::hash::ObjectHash;

/// The variant of a hash-valued reference field (§3 Reference).
///
/// Only [`Reference::Object`] and [`Reference::Id`] participate in reverse
/// maps; BLOB/CLOB references address opaque content instead of another
/// typed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Object(ObjectHash),
    Id(ObjectHash),
    Blob(ObjectHash),
    Clob(ObjectHash),
}

impl Reference {
    pub fn hash(&self) -> ObjectHash {
        match self {
            Reference::Object(h) | Reference::Id(h) | Reference::Blob(h) | Reference::Clob(h) => {
                *h
            }
        }
    }

    /// True for the two variants that the reverse-map index tracks (§3).
    pub fn participates_in_reverse_map(&self) -> bool {
        matches!(self, Reference::Object(_) | Reference::Id(_))
    }

    fn data_type_attr(&self) -> Option<&'static str> {
        match self {
            Reference::Object(_) => None,
            Reference::Id(_) => Some("id"),
            Reference::Blob(_) => Some("blob"),
            Reference::Clob(_) => Some("clob"),
        }
    }

    pub(crate) fn tag(self) -> Option<&'static str> {
        self.data_type_attr()
    }
}

/// A field value in the typed microdata tree (§4.1).
///
/// `Map` keys/values are stored as submitted; the codec sorts entries by
/// canonical key serialization at encode time, so callers need not
/// pre-sort.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Canonical decimal integer, already validated to have no leading
    /// zeros / redundant sign when constructed via [`Value::number`].
    Number(i64),
    Text(String),
    Reference(Reference),
    Bag(Vec<Value>),
    Set(Vec<Value>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn number(n: i64) -> Self {
        Value::Number(n)
    }

    /// Recursively collects every reference reachable from this value,
    /// in depth-first, field-declaration order. This is the "codec's
    /// link-finder" the Chum importer uses to enumerate children (§4.7).
    pub fn collect_references(&self, out: &mut Vec<Reference>) {
        match self {
            Value::Reference(r) => out.push(*r),
            Value::Bag(items) | Value::Set(items) | Value::Array(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    k.collect_references(out);
                    v.collect_references(out);
                }
            }
            Value::Bool(_) | Value::Number(_) | Value::Text(_) => {}
        }
    }
}

/// A single field of a typed object, as supplied by the caller (order is
/// irrelevant here — the recipe's declared order governs encoding).
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// An in-memory typed record prior to canonical encoding (§3 Object).
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub type_name: String,
    pub fields: Vec<Field>,
}

impl Object {
    pub fn new(type_name: impl Into<String>, fields: Vec<(impl Into<String>, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| Field {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Every reference reachable from any field, in recipe-independent
    /// declaration order (callers that need recipe order should encode
    /// first and re-walk; the importer only needs the set of hashes).
    pub fn collect_references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        for field in &self.fields {
            field.value.collect_references(&mut out);
        }
        out
    }
}
