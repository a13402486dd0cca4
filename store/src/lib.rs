//! Content-addressed object store, reverse-map index, and ID-hash cache (§4.3).

mod error;
mod index;
mod store;

pub use error::StoreError;
pub use index::ReverseMapIndex;
pub use store::{ObjectStore, PutResult, PutStatus, StagedWriter};
