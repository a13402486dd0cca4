use crate::error::CryptoError;
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce};
use hkdf::Hkdf;
use parking_lot::Mutex;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};

const NONCE_LEN: usize = 12;

/// The symmetric master key, encrypted at rest under a passphrase-derived
/// key, with the salt and ciphertext stored in separate files (§4.4,
/// §6 "private/keychain_masterkey, private/keychain_salt").
///
/// Holds the decrypted master key behind an explicit, instance-scoped
/// mutex rather than a process-wide global (§9 "Global mutable state").
pub struct Keychain {
    salt_path: PathBuf,
    masterkey_path: PathBuf,
    master: Mutex<Option<[u8; 32]>>,
}

fn derive_kek(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut kek = [0u8; 32];
    hk.expand(b"glyphstore-master-key-kek", &mut kek)
        .expect("32 bytes is a valid HKDF output length");
    kek
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).expect("getrandom");
    buf
}

impl Keychain {
    pub fn new(salt_path: impl Into<PathBuf>, masterkey_path: impl Into<PathBuf>) -> Self {
        Self {
            salt_path: salt_path.into(),
            masterkey_path: masterkey_path.into(),
            master: Mutex::new(None),
        }
    }

    /// Generates a fresh master key, encrypts it under `passphrase`, and
    /// writes both files. Leaves the key loaded.
    pub fn initialize(&self, passphrase: &str) -> Result<(), CryptoError> {
        let salt = random_bytes::<16>();
        let master = random_bytes::<32>();
        self.write_sealed(&salt, passphrase, &master)?;
        *self.master.lock() = Some(master);
        Ok(())
    }

    fn write_sealed(&self, salt: &[u8], passphrase: &str, master: &[u8; 32]) -> Result<(), CryptoError> {
        let kek = derive_kek(passphrase, salt);
        let nonce = random_bytes::<NONCE_LEN>();
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(&kek));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), master.as_ref())
            .expect("encryption with a fresh nonce cannot fail");
        if let Some(parent) = self.salt_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.salt_path, salt)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        fs::write(&self.masterkey_path, sealed)?;
        Ok(())
    }

    /// Loads salt -> derives KEK -> decrypts the master key (§4.4 "Unlock").
    pub fn unlock(&self, passphrase: &str) -> Result<(), CryptoError> {
        let salt = fs::read(&self.salt_path)?;
        let sealed = fs::read(&self.masterkey_path)?;
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::WrongSecret);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let kek = derive_kek(passphrase, &salt);
        let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(&kek));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::WrongSecret)?;
        let mut master = [0u8; 32];
        master.copy_from_slice(&plaintext);
        *self.master.lock() = Some(master);
        Ok(())
    }

    /// Zeroes the in-memory master key (§4.4 "Lock").
    pub fn lock(&self) {
        if let Some(mut key) = self.master.lock().take() {
            key.fill(0);
        }
    }

    /// Decrypts with `old`, re-encrypts under `new`, and rewrites both
    /// files (§4.4 "Change secret").
    pub fn change_secret(&self, old: &str, new: &str) -> Result<(), CryptoError> {
        self.unlock(old)?;
        let master = self.master_key()?;
        let salt = random_bytes::<16>();
        self.write_sealed(&salt, new, &master)?;
        Ok(())
    }

    pub fn master_key(&self) -> Result<[u8; 32], CryptoError> {
        self.master.lock().ok_or(CryptoError::KeyNotLoaded)
    }

    pub fn is_unlocked(&self) -> bool {
        self.master.lock().is_some()
    }

    pub fn salt_path(&self) -> &Path {
        &self.salt_path
    }

    pub fn masterkey_path(&self) -> &Path {
        &self.masterkey_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let kc = Keychain::new(dir.path().join("salt"), dir.path().join("masterkey"));
        kc.initialize("correct horse").unwrap();
        let master = kc.master_key().unwrap();
        kc.lock();
        assert!(matches!(kc.master_key(), Err(CryptoError::KeyNotLoaded)));
        kc.unlock("correct horse").unwrap();
        assert_eq!(kc.master_key().unwrap(), master);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let dir = tempfile::tempdir().unwrap();
        let kc = Keychain::new(dir.path().join("salt"), dir.path().join("masterkey"));
        kc.initialize("correct horse").unwrap();
        kc.lock();
        assert!(matches!(kc.unlock("wrong"), Err(CryptoError::WrongSecret)));
    }

    #[test]
    fn change_secret_then_unlock_with_new() {
        let dir = tempfile::tempdir().unwrap();
        let kc = Keychain::new(dir.path().join("salt"), dir.path().join("masterkey"));
        kc.initialize("old").unwrap();
        let master = kc.master_key().unwrap();
        kc.lock();
        kc.change_secret("old", "new").unwrap();
        kc.lock();
        kc.unlock("new").unwrap();
        assert_eq!(kc.master_key().unwrap(), master);
        kc.lock();
        assert!(matches!(kc.unlock("old"), Err(CryptoError::WrongSecret)));
    }
}
