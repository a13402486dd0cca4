use glyphstore_codec::{CodecError, ObjectHash};
use thiserror::Error;

/// Errors raised by the object store (§4.3, §7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectHash),

    #[error("object {hash} content does not hash to its filename (computed {computed})")]
    HashMismatch { hash: ObjectHash, computed: ObjectHash },

    #[error("CLOB content is not valid UTF-8")]
    NotUtf8,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("underlying store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("underlying index error: {0}")]
    Sled(#[from] sled::Error),
}
