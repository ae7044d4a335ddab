//! On-disk layout of the state directory:
//!
//! ```text
//! <dir>/order.json            profile names, current first
//! <dir>/profiles/<name>.json  one file per profile
//! ```
//!
//! Every write goes to a temporary file in the target directory which is
//! then renamed over the destination, so a failed write never leaves a
//! truncated file behind. Profile files that cannot be parsed are renamed
//! to `<name>.json.corrupt` on load and never overwritten.

use crate::error::{Error, Result};
use crate::profile::{validate_name, Profile};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const PROFILES_DIR: &str = "profiles";
pub const ORDER_FILE: &str = "order.json";
const PROFILE_EXT: &str = "json";
const CORRUPT_EXT: &str = "corrupt";

#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProfileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.{PROFILE_EXT}"))
    }

    fn order_path(&self) -> PathBuf {
        self.root.join(ORDER_FILE)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.profiles_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))
    }

    /// Loads every `*.json` file under `profiles/`. Files that cannot be
    /// read or parsed are returned as errors next to the good profiles.
    /// Only a failure to list the directory itself is an `Err`.
    pub fn load_all(&self) -> Result<(Vec<Profile>, Vec<Error>)> {
        let dir = self.profiles_dir();
        let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == PROFILE_EXT) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut profiles = Vec::new();
        let mut errors = Vec::new();
        for path in paths {
            match Self::load_file(&path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    tracing::warn!("skipping profile file: {}", e);
                    if !matches!(e, Error::Io { .. }) {
                        match Self::quarantine(&path) {
                            Ok(backup) => {
                                tracing::warn!("moved {} to {}", path.display(), backup.display())
                            }
                            Err(qe) => errors.push(qe),
                        }
                    }
                    errors.push(e);
                }
            }
        }
        Ok((profiles, errors))
    }

    fn load_file(path: &Path) -> Result<Profile> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let profile: Profile = serde_json::from_str(&content).map_err(|e| Error::corrupt(path, e))?;
        validate_name(profile.name())?;

        // the file name is authoritative
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if profile.name() != stem {
            return Err(Error::Validation(format!(
                "{}: profile name '{}' does not match its file name",
                path.display(),
                profile.name()
            )));
        }
        Ok(profile)
    }

    /// Renames an unusable profile file so it is neither loaded again nor
    /// replaced by a new profile of the same name.
    fn quarantine(path: &Path) -> Result<PathBuf> {
        let mut backup = path.with_extension(format!("{PROFILE_EXT}.{CORRUPT_EXT}"));
        let mut n = 1;
        while backup.exists() {
            backup = path.with_extension(format!("{PROFILE_EXT}.{CORRUPT_EXT}.{n}"));
            n += 1;
        }
        fs::rename(path, &backup).map_err(|e| Error::io(path, e))?;
        Ok(backup)
    }

    /// Persisted ordering, or an empty list if none was written yet.
    pub fn load_order(&self) -> Result<Vec<String>> {
        let path = self.order_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| Error::corrupt(&path, e))
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        let path = self.profile_path(profile.name());
        let content = serde_json::to_string_pretty(profile).map_err(|e| Error::corrupt(&path, e))?;
        Self::write_atomic(&path, content.as_bytes())
    }

    pub fn save_order<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let path = self.order_path();
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        let content = serde_json::to_string_pretty(&names).map_err(|e| Error::corrupt(&path, e))?;
        Self::write_atomic(&path, content.as_bytes())
    }

    pub fn delete_profile(&self, name: &str) -> Result<()> {
        let path = self.profile_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(content).map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
        tracing::debug!("wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_profile() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();

        let mut profile = Profile::new("work").unwrap();
        profile.environment_mut().user_mut().set("K", "v").unwrap();
        store.save_profile(&profile).unwrap();

        let (profiles, errors) = store.load_all().unwrap();
        assert!(errors.is_empty());
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name(), "work");
        assert!(store.profile_path("work").exists());
    }

    #[test]
    fn corrupt_file_is_reported_and_skipped() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();

        store.save_profile(&Profile::new("good").unwrap()).unwrap();
        fs::write(store.profile_path("bad"), "{ not json").unwrap();

        let (profiles, errors) = store.load_all().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name(), "good");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::Corrupt { .. }));

        let backup = dir.path().join(PROFILES_DIR).join("bad.json.corrupt");
        assert_eq!(fs::read_to_string(backup).unwrap(), "{ not json");
        assert!(!store.profile_path("bad").exists());

        // a second corrupt file of the same name keeps the first backup
        fs::write(store.profile_path("bad"), "again").unwrap();
        let (_, errors) = store.load_all().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(dir.path().join(PROFILES_DIR).join("bad.json.corrupt.1").exists());
    }

    #[test]
    fn invalid_stored_name_is_rejected() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();

        let content = serde_json::to_string(&Profile::new("ok").unwrap())
            .unwrap()
            .replace("\"ok\"", "\"Bad Name\"");
        fs::write(store.profile_path("Bad Name"), content).unwrap();

        let (profiles, errors) = store.load_all().unwrap();
        assert!(profiles.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::InvalidName(_)));
    }

    #[test]
    fn mismatched_name_is_rejected() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();

        let content = serde_json::to_string(&Profile::new("other").unwrap()).unwrap();
        fs::write(store.profile_path("mine"), content).unwrap();

        let (profiles, errors) = store.load_all().unwrap();
        assert!(profiles.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn non_json_files_are_ignored() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();
        fs::write(dir.path().join(PROFILES_DIR).join("notes.txt"), "hello").unwrap();

        let (profiles, errors) = store.load_all().unwrap();
        assert!(profiles.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn order_round_trip_and_default() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(store.load_order().unwrap().is_empty());

        store.save_order(&["b", "a"]).unwrap();
        assert_eq!(store.load_order().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn delete_missing_profile_is_ok() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();
        assert!(store.delete_profile("ghost").is_ok());
    }

    #[test]
    fn failed_write_leaves_existing_file_intact() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.ensure_dirs().unwrap();
        store.save_order(&["a"]).unwrap();

        // a directory where the temp file would be renamed to
        let blocked = dir.path().join(PROFILES_DIR).join("x.json");
        fs::create_dir_all(&blocked).unwrap();
        assert!(ProfileStore::write_atomic(&blocked, b"data").is_err());

        assert_eq!(store.load_order().unwrap(), vec!["a"]);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join(PROFILES_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }
}
