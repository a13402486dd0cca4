use thiserror::Error;

/// Errors raised by the canonical codec (§4.1, §7).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("type `{0}` is not registered in the recipe registry")]
    UnknownType(String),

    #[error("recipe for `{type_name}` requires field `{field}`")]
    MissingField { type_name: String, field: String },

    #[error("field `{field}` on `{type_name}` has the wrong kind")]
    WrongKind { type_name: String, field: String },

    #[error("malformed microdata: {0}")]
    Malformed(String),

    #[error("decoded value does not re-encode to the same bytes (not canonical)")]
    NotCanonical,

    #[error("`{0}` is not a valid canonical number")]
    InvalidNumber(String),

    #[error("`{0}` is not a 64-digit lowercase hex hash")]
    InvalidHash(String),

    #[error("object hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },
}
