use crate::error::StoreError;
use glyphstore_codec::ObjectHash;

/// Tagged-key reverse-map index over a single sled tree: for each
/// `(target hash, target type)` pair, a listing of referencing hashes
/// (§4.3). Grounded on the teacher's `Docs` sled byte-tagged-key layout.
pub struct ReverseMapIndex {
    tree: sled::Tree,
}

fn key(target: &ObjectHash, target_type: &str, referencing: &ObjectHash) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + target_type.len() + 1 + 32);
    buf.extend_from_slice(target.as_bytes());
    buf.extend_from_slice(target_type.as_bytes());
    buf.push(0); // separator: type names cannot contain NUL
    buf.extend_from_slice(referencing.as_bytes());
    buf
}

fn prefix(target: &ObjectHash, target_type: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + target_type.len() + 1);
    buf.extend_from_slice(target.as_bytes());
    buf.extend_from_slice(target_type.as_bytes());
    buf.push(0);
    buf
}

impl ReverseMapIndex {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree("reverse_map")?,
        })
    }

    pub fn record(
        &self,
        target: &ObjectHash,
        target_type: &str,
        referencing: &ObjectHash,
    ) -> Result<(), StoreError> {
        self.tree.insert(key(target, target_type, referencing), &[])?;
        Ok(())
    }

    pub fn list(&self, target: &ObjectHash, target_type: &str) -> Result<Vec<ObjectHash>, StoreError> {
        let prefix = prefix(target, target_type);
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(&prefix) {
            let (k, _) = entry?;
            let hash_bytes = &k[k.len() - 32..];
            let mut arr = [0u8; 32];
            arr.copy_from_slice(hash_bytes);
            out.push(ObjectHash::from_bytes(arr));
        }
        Ok(out)
    }
}
