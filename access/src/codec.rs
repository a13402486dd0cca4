//! Typed conversion between [`Access`]/[`IdAccess`] and the untyped
//! [`Object`] the microdata codec encodes/decodes (§3 Access, IdAccess).

use crate::policy::{Access, IdAccess};
use glyphstore_codec::{FieldDef, Kind, Object, ObjectHash, Recipe, Reference, Value};
use std::collections::BTreeSet;

pub fn access_recipe() -> Recipe {
    Recipe::new(
        "Access",
        vec![
            FieldDef::new("target", Kind::RefObject),
            FieldDef::new("persons", Kind::Set(Box::new(Kind::RefObject))),
            FieldDef::new("groups", Kind::Set(Box::new(Kind::RefObject))),
        ],
    )
}

pub fn id_access_recipe() -> Recipe {
    Recipe::new(
        "IdAccess",
        vec![
            FieldDef::new("target_id", Kind::RefId),
            FieldDef::new("persons", Kind::Set(Box::new(Kind::RefObject))),
            FieldDef::new("groups", Kind::Set(Box::new(Kind::RefObject))),
        ],
    )
}

fn object_ref_set(value: &Value) -> Option<BTreeSet<ObjectHash>> {
    match value {
        Value::Set(items) => items
            .iter()
            .map(|v| match v {
                Value::Reference(Reference::Object(h)) => Some(*h),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn ref_set_value(hashes: &BTreeSet<ObjectHash>) -> Value {
    Value::Set(hashes.iter().map(|h| Value::Reference(Reference::Object(*h))).collect())
}

/// Decodes an `Access` object, returning `None` if `obj` is not one (wrong
/// type name, or a field of the wrong shape).
pub fn access_from_object(obj: &Object) -> Option<Access> {
    if obj.type_name != "Access" {
        return None;
    }
    let target = match obj.field("target")? {
        Value::Reference(Reference::Object(h)) => *h,
        _ => return None,
    };
    Some(Access {
        target,
        persons: object_ref_set(obj.field("persons")?)?,
        groups: object_ref_set(obj.field("groups")?)?,
    })
}

/// Decodes an `IdAccess` object, returning `None` if `obj` is not one.
pub fn id_access_from_object(obj: &Object) -> Option<IdAccess> {
    if obj.type_name != "IdAccess" {
        return None;
    }
    let target_id = match obj.field("target_id")? {
        Value::Reference(Reference::Id(h)) => *h,
        _ => return None,
    };
    Some(IdAccess {
        target_id,
        persons: object_ref_set(obj.field("persons")?)?,
        groups: object_ref_set(obj.field("groups")?)?,
    })
}

pub fn access_to_object(access: &Access) -> Object {
    Object::new(
        "Access",
        vec![
            ("target", Value::Reference(Reference::Object(access.target))),
            ("persons", ref_set_value(&access.persons)),
            ("groups", ref_set_value(&access.groups)),
        ],
    )
}

pub fn id_access_to_object(access: &IdAccess) -> Object {
    Object::new(
        "IdAccess",
        vec![
            ("target_id", Value::Reference(Reference::Id(access.target_id))),
            ("persons", ref_set_value(&access.persons)),
            ("groups", ref_set_value(&access.groups)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphstore_codec::encode;

    fn hash(tag: &str) -> ObjectHash {
        ObjectHash::of(tag.as_bytes())
    }

    #[test]
    fn access_object_roundtrips_through_the_codec() {
        let access = Access {
            target: hash("target"),
            persons: [hash("alice")].into_iter().collect(),
            groups: BTreeSet::new(),
        };
        let recipe = access_recipe();
        let microdata = encode(&recipe, &access_to_object(&access)).unwrap();
        let decoded = glyphstore_codec::decode(&{
            let registry = glyphstore_codec::RecipeRegistry::new();
            registry.register(recipe);
            registry
        }, &microdata)
        .unwrap();
        assert_eq!(access_from_object(&decoded).unwrap(), access);
    }

    #[test]
    fn id_access_object_roundtrips_through_the_codec() {
        let id_access = IdAccess {
            target_id: hash("profile-id"),
            persons: BTreeSet::new(),
            groups: [hash("group")].into_iter().collect(),
        };
        let recipe = id_access_recipe();
        let microdata = encode(&recipe, &id_access_to_object(&id_access)).unwrap();
        let registry = glyphstore_codec::RecipeRegistry::new();
        registry.register(recipe);
        let decoded = glyphstore_codec::decode(&registry, &microdata).unwrap();
        assert_eq!(id_access_from_object(&decoded).unwrap(), id_access);
    }

    #[test]
    fn wrong_type_name_is_rejected() {
        let obj = Object::new("Note", vec![("body", Value::Text("hi".into()))]);
        assert!(access_from_object(&obj).is_none());
        assert!(id_access_from_object(&obj).is_none());
    }
}
