//! Version tree and CRDT merge algorithms: Register and OptionalValue (§4.2).

mod error;
pub mod optional;
pub mod register;
mod tree;

pub use error::CrdtError;
pub use tree::{Op, VersionNode, VersionTree};
