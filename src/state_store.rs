use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;

/// Persists the per-device controlled-by-us flags as a small JSON map so a
/// restart does not strand a device we turned on. Store errors are never
/// fatal; the caller logs them and falls back to all-false flags.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the saved flags. A missing file is an empty map, not an error.
    pub fn load(&self) -> anyhow::Result<BTreeMap<String, bool>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading state file {}", self.path.display()))?;
        let flags = serde_json::from_str(&raw)
            .with_context(|| format!("parsing state file {}", self.path.display()))?;
        Ok(flags)
    }

    pub fn save(&self, flags: &BTreeMap<String, bool>) -> anyhow::Result<()> {
        let raw = serde_json::to_string(flags).context("serializing device flags")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing state file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let mut flags = BTreeMap::new();
        flags.insert("relay".to_string(), true);
        flags.insert("lamp".to_string(), false);
        store.save(&flags).unwrap();

        assert_eq!(store.load().unwrap(), flags);
    }

    #[test]
    fn test_save_overwrites_previous_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let mut flags = BTreeMap::new();
        flags.insert("relay".to_string(), true);
        store.save(&flags).unwrap();

        flags.insert("relay".to_string(), false);
        store.save(&flags).unwrap();
        assert_eq!(store.load().unwrap().get("relay"), Some(&false));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = StateStore::new(path);
        assert!(store.load().is_err());
    }
}
