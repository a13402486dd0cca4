use crate::error::CryptoError;
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce as AeadNonce};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use ed25519_dalek::{Keypair as SignKeypair, PublicKey as VerifyKey, SecretKey as SignSecretKey, Signature, Signer, Verifier};
use rand::rngs::OsRng;

const BOX_NONCE_LEN: usize = 24;
const SYMMETRIC_NONCE_LEN: usize = 12;

/// Asymmetric box encrypt/decrypt, sign/verify, and symmetric
/// encrypt-with-embedded-nonce, all operating on raw key bytes held by the
/// caller (the keychain owns loading/unloading them) (§4.4).
pub struct CryptoApi {
    secret_key: [u8; 32],
    secret_sign_key: [u8; 32],
}

impl CryptoApi {
    pub fn new(secret_key: [u8; 32], secret_sign_key: [u8; 32]) -> Self {
        Self {
            secret_key,
            secret_sign_key,
        }
    }

    fn sign_keypair(&self) -> SignKeypair {
        let secret = SignSecretKey::from_bytes(&self.secret_sign_key).expect("32-byte secret key");
        let public = (&secret).into();
        SignKeypair { secret, public }
    }

    /// Encrypts `plaintext` for `to` (their x25519 public key), using a
    /// fresh random nonce and returning `nonce || ciphertext`.
    pub fn encrypt(&self, to: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
        let my_secret = SecretKey::from(self.secret_key);
        let their_public = PublicKey::from(*to);
        let sbox = SalsaBox::new(&their_public, &my_secret);
        let nonce = crypto_box::generate_nonce(&mut OsRng);
        let ciphertext = sbox.encrypt(&nonce, plaintext).expect("encryption cannot fail");
        let mut out = Vec::with_capacity(BOX_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypts `nonce || ciphertext` sent by `from` (their x25519 public key).
    pub fn decrypt(&self, from: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < BOX_NONCE_LEN {
            return Err(CryptoError::DecryptFailed);
        }
        let (nonce, body) = ciphertext.split_at(BOX_NONCE_LEN);
        let mut nonce_bytes = [0u8; BOX_NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);
        let my_secret = SecretKey::from(self.secret_key);
        let their_public = PublicKey::from(*from);
        let sbox = SalsaBox::new(&their_public, &my_secret);
        sbox.decrypt(&nonce_bytes.into(), body)
            .map_err(|_| CryptoError::DecryptFailed)
    }

    /// Signs `data` with this identity's ed25519 secret key.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.sign_keypair().sign(data).to_bytes()
    }

    /// Verifies a signature produced by `by` (their ed25519 public key).
    pub fn verify(by: &[u8; 32], data: &[u8], sig: &[u8; 64]) -> Result<(), CryptoError> {
        let public = VerifyKey::from_bytes(by).map_err(|_| CryptoError::VerifyFailed)?;
        let signature = Signature::from_bytes(sig).map_err(|_| CryptoError::VerifyFailed)?;
        public.verify(data, &signature).map_err(|_| CryptoError::VerifyFailed)
    }

    /// Symmetric encrypt with a fresh random nonce embedded in the output
    /// (§4.4 "encryptAndEmbedNonce").
    pub fn encrypt_and_embed_nonce(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; SYMMETRIC_NONCE_LEN];
        getrandom::getrandom(&mut nonce_bytes).expect("getrandom");
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(key));
        let ciphertext = cipher
            .encrypt(AeadNonce::from_slice(&nonce_bytes), plaintext)
            .expect("encryption with a fresh nonce cannot fail");
        let mut out = Vec::with_capacity(SYMMETRIC_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Inverse of [`Self::encrypt_and_embed_nonce`] (§4.4
    /// "decryptWithEmbeddedNonce").
    pub fn decrypt_with_embedded_nonce(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SYMMETRIC_NONCE_LEN {
            return Err(CryptoError::DecryptFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(SYMMETRIC_NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(key));
        cipher
            .decrypt(AeadNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_default_keypair;

    #[test]
    fn asymmetric_roundtrip() {
        let (keys_a, _, secret_a) = generate_default_keypair();
        let (keys_b, _, secret_b) = generate_default_keypair();
        let api_a = CryptoApi::new(secret_a.secret_key, secret_a.secret_sign_key);
        let api_b = CryptoApi::new(secret_b.secret_key, secret_b.secret_sign_key);

        let ciphertext = api_a.encrypt(&keys_b.public_key, b"hello bob");
        let plaintext = api_b.decrypt(&keys_a.public_key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello bob");
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (keys, _, secret) = generate_default_keypair();
        let api = CryptoApi::new(secret.secret_key, secret.secret_sign_key);
        let sig = api.sign(b"payload");
        CryptoApi::verify(&keys.public_sign_key, b"payload", &sig).unwrap();
        assert!(CryptoApi::verify(&keys.public_sign_key, b"tampered", &sig).is_err());
    }

    #[test]
    fn symmetric_roundtrip() {
        let key = [9u8; 32];
        let sealed = CryptoApi::encrypt_and_embed_nonce(&key, b"secret payload");
        let plaintext = CryptoApi::decrypt_with_embedded_nonce(&key, &sealed).unwrap();
        assert_eq!(plaintext, b"secret payload");
    }
}
