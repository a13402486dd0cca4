use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Small key/value settings store persisted as `settings.json`
/// (§6 "settings.json — key/value settings store (small)"; not detailed
/// further by §4, so kept deliberately simple rather than growing its own
/// schema).
pub struct Settings {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl Settings {
    /// Loads `settings.json` from `instance_dir` if present, else starts
    /// empty.
    pub fn load(instance_dir: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = instance_dir.as_ref().join("settings.json");
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err),
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Writes the current values to disk atomically (temp + rename, same
    /// write-once discipline the object store uses for content files).
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert!(settings.get("anything").is_none());
    }

    #[test]
    fn set_save_and_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path()).unwrap();
        settings.set("commServerUrl", Value::String("wss://example".into()));
        settings.save().unwrap();

        let reloaded = Settings::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("commServerUrl").unwrap(), "wss://example");
    }

    #[test]
    fn remove_deletes_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path()).unwrap();
        settings.set("flag", Value::Bool(true));
        settings.remove("flag");
        assert!(settings.get("flag").is_none());
    }
}
