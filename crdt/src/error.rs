use glyphstore_codec::ObjectHash;
use thiserror::Error;

/// Errors raised by version-tree traversal and CRDT merge (§4.2, §7).
#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("version node {0} is not present in the tree")]
    NotFound(ObjectHash),

    #[error("cycle detected while traversing predecessors of {0}")]
    CycleDetected(ObjectHash),
}
