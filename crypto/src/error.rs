use thiserror::Error;

/// Errors raised by the keychain and crypto API (§4.4, §7).
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key is not loaded; call unlock() first")]
    KeyNotLoaded,

    #[error("decryption failed (wrong key, wrong secret, or tampered ciphertext)")]
    DecryptFailed,

    #[error("passphrase does not unlock the stored master key")]
    WrongSecret,

    #[error("this instance already has a default keypair")]
    HasDefaultKeys,

    #[error("signature verification failed")]
    VerifyFailed,

    #[error("nonce space exhausted")]
    NonceExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
