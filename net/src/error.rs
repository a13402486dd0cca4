use thiserror::Error;

/// Errors raised by the connection pipeline, handshake, and pairing
/// (§4.5, §4.6, §7).
#[derive(Debug, Error)]
pub enum NetError {
    #[error("nonce counter exhausted")]
    NonceExhausted,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("unknown pairing token")]
    UnknownToken,

    #[error("pairing token expired")]
    TokenExpired,

    #[error("peer identity did not match the expected person")]
    WrongPerson,

    #[error("identity exchange failed")]
    IdentityExchangeFailed,

    #[error("protocol version mismatch: local={local}, remote={remote}")]
    ProtocolVersionMismatch { local: u32, remote: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
