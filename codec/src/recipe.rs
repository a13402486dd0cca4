use crate::error::CodecError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The declared shape of a field, used both to fix encoding order and to
/// validate instances (§4.1 "recipe (schema)").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Number,
    Text,
    RefObject,
    RefId,
    RefBlob,
    RefClob,
    Bag(Box<Kind>),
    Set(Box<Kind>),
    Array(Box<Kind>),
    Map(Box<Kind>, Box<Kind>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: Kind,
    /// Whether this field is part of the ID-object (§3 ID object).
    pub identity: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            identity: false,
        }
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// The fixed field order and kinds for one object type (§4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipe {
    pub type_name: String,
    pub fields: Vec<FieldDef>,
}

impl Recipe {
    pub fn new(type_name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.identity)
    }

    pub fn is_versioned(&self) -> bool {
        self.fields.iter().any(|f| f.identity)
    }
}

/// A registry mapping type name to [`Recipe`]; the escape hatch for
/// user-declared types registered at runtime (§9 "closed sum type ...
/// plus an extensibility escape hatch").
#[derive(Clone, Default)]
pub struct RecipeRegistry {
    recipes: Arc<RwLock<HashMap<String, Recipe>>>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, recipe: Recipe) {
        self.recipes.write().insert(recipe.type_name.clone(), recipe);
    }

    pub fn get(&self, type_name: &str) -> Result<Recipe, CodecError> {
        self.recipes
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.recipes.read().contains_key(type_name)
    }
}
