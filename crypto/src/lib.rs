//! Keychain (master key lifecycle) and crypto API (§4.4).

mod api;
mod error;
mod keychain;
mod keys;

pub use api::CryptoApi;
pub use error::CryptoError;
pub use keychain::Keychain;
pub use keys::{generate_default_keypair, KeyStore, KeysObject, SecretKeys};
