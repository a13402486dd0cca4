use glyphstore_codec::{CodecError, ObjectHash};
use thiserror::Error;

/// Errors raised by the Chum protocol (§4.7, §7).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    ProtocolVersionMismatch { local: u32, remote: u32 },

    #[error("malformed chum message: {0}")]
    Protocol(String),

    #[error("object {0} not found")]
    NotFound(ObjectHash),

    #[error("object hash mismatch: requested {requested}, computed {computed}")]
    HashMismatch { requested: ObjectHash, computed: ObjectHash },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] glyphstore_store::StoreError),

    #[error(transparent)]
    Crdt(#[from] glyphstore_crdt::CrdtError),

    #[error("peer closed the connection")]
    PeerClosed,
}
