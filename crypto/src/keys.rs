use crate::error::CryptoError;
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce};
use ed25519_dalek::Keypair as SignKeypair;
use glyphstore_codec::ObjectHash;
use rand::rngs::OsRng;

const NONCE_LEN: usize = 12;
const DEFAULT_MARKER: &[u8] = b"has-default-keys";

/// The public half of a per-identity Keys object (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeysObject {
    pub public_key: [u8; 32],
    pub public_sign_key: [u8; 32],
}

/// The secret half, which must never be written to disk in cleartext
/// (§3 invariant "Secret keys never exist on disk in cleartext").
pub struct SecretKeys {
    pub secret_key: [u8; 32],
    pub secret_sign_key: [u8; 32],
}

fn keys_hash_of(obj: &KeysObject) -> ObjectHash {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(&obj.public_key);
    bytes.extend_from_slice(&obj.public_sign_key);
    ObjectHash::of(&bytes)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).expect("getrandom");
    buf
}

/// Generates a fresh x25519 box keypair and ed25519 signing keypair,
/// returning the public Keys object and its hash alongside the secret
/// halves to be sealed under the master key.
pub fn generate_default_keypair() -> (KeysObject, ObjectHash, SecretKeys) {
    let box_secret = crypto_box::SecretKey::generate(&mut OsRng);
    let box_public = box_secret.public_key();
    let sign_keypair = SignKeypair::generate(&mut OsRng);

    let keys = KeysObject {
        public_key: *box_public.as_bytes(),
        public_sign_key: sign_keypair.public.to_bytes(),
    };
    let hash = keys_hash_of(&keys);
    let secret = SecretKeys {
        secret_key: box_secret.to_bytes(),
        secret_sign_key: sign_keypair.secret.to_bytes(),
    };
    (keys, hash, secret)
}

/// Storage for the encrypted secret halves, keyed by Keys-object hash, in a
/// single sled tree (§3 "secret halves are stored encrypted under the
/// master key keyed by the Keys-object hash"; grounded on the teacher's
/// `Secrets`/`Metadata` newtype-over-`sled::Tree` idiom).
pub struct KeyStore {
    tree: sled::Tree,
}

impl KeyStore {
    pub fn open(db: &sled::Db) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree("private_keys")?,
        })
    }

    pub fn has_default_keys(&self) -> Result<bool, sled::Error> {
        Ok(self.tree.get(DEFAULT_MARKER)?.is_some())
    }

    /// Returns the hash of the default Keys object, if one has been
    /// established, so callers can load its public halves from the object
    /// store and its secret halves via [`KeyStore::load_secret`].
    pub fn default_keys_hash(&self) -> Result<Option<ObjectHash>, sled::Error> {
        Ok(self.tree.get(DEFAULT_MARKER)?.map(|bytes| {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&bytes);
            ObjectHash::from_bytes(buf)
        }))
    }

    /// Seals `secret` under `master_key` and stores it against `keys_hash`;
    /// fails [`CryptoError::HasDefaultKeys`] if a default identity already
    /// exists and `is_default` is requested again.
    pub fn store_secret(
        &self,
        keys_hash: ObjectHash,
        secret: &SecretKeys,
        master_key: &[u8; 32],
        is_default: bool,
    ) -> Result<(), CryptoError> {
        if is_default && self.has_default_keys()? {
            return Err(CryptoError::HasDefaultKeys);
        }
        let mut plaintext = Vec::with_capacity(64);
        plaintext.extend_from_slice(&secret.secret_key);
        plaintext.extend_from_slice(&secret.secret_sign_key);
        let nonce = random_bytes::<NONCE_LEN>();
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(master_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .expect("encryption with a fresh nonce cannot fail");
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        self.tree.insert(keys_hash.as_bytes(), sealed)?;
        if is_default {
            self.tree.insert(DEFAULT_MARKER, keys_hash.as_bytes().to_vec())?;
        }
        Ok(())
    }

    pub fn load_secret(&self, keys_hash: ObjectHash, master_key: &[u8; 32]) -> Result<SecretKeys, CryptoError> {
        let sealed = self
            .tree
            .get(keys_hash.as_bytes())?
            .ok_or(CryptoError::KeyNotLoaded)?;
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::DecryptFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(master_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        let mut secret_key = [0u8; 32];
        let mut secret_sign_key = [0u8; 32];
        secret_key.copy_from_slice(&plaintext[..32]);
        secret_sign_key.copy_from_slice(&plaintext[32..]);
        Ok(SecretKeys {
            secret_key,
            secret_sign_key,
        })
    }
}
