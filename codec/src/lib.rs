//! Canonical microdata codec and content hashing (§3, §4.1, §6).
//!
//! An [`Object`] is encoded against a [`Recipe`] into a fixed, whitespace-free
//! textual form; the SHA-256 of that text is the object's [`ObjectHash`].
//! Decoding re-encodes the result and rejects any input that does not come
//! back byte-identical, so every hash in the system addresses exactly one
//! canonical byte string.

mod codec;
mod error;
mod hash;
mod recipe;
mod value;

pub use codec::{decode, encode, encode_id_object, hash_of, id_hash};
pub use error::CodecError;
pub use hash::ObjectHash;
pub use recipe::{FieldDef, Kind, Recipe, RecipeRegistry};
pub use value::{Field, Object, Reference, Value};
