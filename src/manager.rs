use crate::error::{Error, Result};
use crate::profile::{validate_name, Profile, ProfileSummary, DEFAULT_PROFILE};
use crate::store::ProfileStore;

use std::path::{Path, PathBuf};

/// Owns every profile and keeps them in activation order. The profile at
/// index 0 is the current one; there is no other notion of "active".
///
/// Each mutating operation writes to disk before it changes the in-memory
/// state, so a failed write leaves both untouched.
#[derive(Debug)]
pub struct ProfileManager {
    store: ProfileStore,
    profiles: Vec<Profile>,
}

impl ProfileManager {
    /// Loads every profile under `dir`. Unreadable profile files are
    /// returned as non-fatal errors. When nothing usable is found a default
    /// profile is synthesized and persisted.
    pub fn init(dir: impl Into<PathBuf>) -> Result<(Self, Vec<Error>)> {
        let store = ProfileStore::new(dir);
        store.ensure_dirs()?;

        let (mut loaded, mut errors) = store.load_all()?;
        let order = store.load_order().unwrap_or_else(|e| {
            tracing::warn!("ignoring profile order: {}", e);
            errors.push(e);
            Vec::new()
        });

        let mut profiles = Vec::with_capacity(loaded.len());
        for name in order.iter() {
            if let Some(pos) = loaded.iter().position(|p| p.name() == name) {
                profiles.push(loaded.remove(pos));
            }
        }
        // profiles the order file does not know about, already sorted by name
        profiles.append(&mut loaded);

        let mut manager = ProfileManager { store, profiles };
        if manager.profiles.is_empty() {
            let path = manager.store.profile_path(DEFAULT_PROFILE);
            if path.exists() {
                // an unreadable default that could not be moved aside
                return Err(Error::Validation(format!(
                    "{} exists but cannot be loaded; refusing to overwrite it",
                    path.display()
                )));
            }
            tracing::info!("no profiles found, creating '{}'", DEFAULT_PROFILE);
            let profile = Profile::new(DEFAULT_PROFILE)?;
            manager.store.save_profile(&profile)?;
            manager.store.save_order(&[DEFAULT_PROFILE])?;
            manager.profiles.push(profile);
        } else {
            manager.save_order()?;
        }

        tracing::debug!(
            "loaded {} profile(s), current is '{}'",
            manager.profiles.len(),
            manager.current().name()
        );
        Ok((manager, errors))
    }

    pub fn dir(&self) -> &Path {
        self.store.root()
    }

    pub fn current(&self) -> &Profile {
        &self.profiles[0]
    }

    /// Applies `f` to a copy of the current profile and persists the copy.
    /// The in-memory profile is only replaced once the write succeeded.
    pub fn update_current<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Profile) -> Result<T>,
    {
        let mut updated = self.current().clone();
        let out = f(&mut updated)?;
        self.store.save_profile(&updated)?;
        self.profiles[0] = updated;
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name() == name)
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.profiles
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name()).collect()
    }

    /// Creates an empty profile and makes it current.
    pub fn create(&mut self, name: &str) -> Result<&Profile> {
        validate_name(name)?;
        if self.get(name).is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let profile = Profile::new(name)?;
        let mut order = self.names();
        order.insert(0, name);

        self.store.save_profile(&profile)?;
        if let Err(e) = self.store.save_order(&order) {
            let _ = self.store.delete_profile(name);
            return Err(e);
        }

        tracing::info!("created profile '{}'", name);
        self.profiles.insert(0, profile);
        Ok(self.current())
    }

    /// Makes `name` current by moving it to the front.
    pub fn use_profile(&mut self, name: &str) -> Result<&Profile> {
        let pos = self.position(name)?;
        if pos != 0 {
            let mut order = self.names();
            let moved = order.remove(pos);
            order.insert(0, moved);
            self.store.save_order(&order)?;

            let profile = self.profiles.remove(pos);
            self.profiles.insert(0, profile);
        }
        tracing::info!("using profile '{}'", name);
        Ok(self.current())
    }

    /// Deletes a profile. Removing the last one leaves a fresh default
    /// profile behind.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let pos = self.position(name)?;
        if self.profiles.len() == 1 {
            return self.replace_last_with_default();
        }

        let mut order = self.names();
        order.remove(pos);
        self.store.save_order(&order)?;
        if let Err(e) = self.store.delete_profile(name) {
            let _ = self.save_order();
            return Err(e);
        }
        self.profiles.remove(pos);
        tracing::info!("removed profile '{}'", name);
        Ok(())
    }

    /// The replacement default is written before the last profile goes, so
    /// a failed write keeps the manager at one profile.
    fn replace_last_with_default(&mut self) -> Result<()> {
        let old = self.current().name().to_string();
        let fresh = Profile::new(DEFAULT_PROFILE)?;

        self.store.save_profile(&fresh)?;
        let restore = |manager: &Self| {
            if old == DEFAULT_PROFILE {
                let _ = manager.store.save_profile(manager.current());
            } else {
                let _ = manager.store.delete_profile(DEFAULT_PROFILE);
            }
            let _ = manager.save_order();
        };
        if let Err(e) = self.store.save_order(&[DEFAULT_PROFILE]) {
            restore(&*self);
            return Err(e);
        }
        if old != DEFAULT_PROFILE {
            if let Err(e) = self.store.delete_profile(&old) {
                restore(&*self);
                return Err(e);
            }
        }

        self.profiles = vec![fresh];
        tracing::info!("removed profile '{}', recreated '{}'", old, DEFAULT_PROFILE);
        Ok(())
    }

    /// Renames a profile in place, keeping its position and contents.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let pos = self.position(old)?;
        if old == new {
            return Ok(());
        }
        if self.get(new).is_some() {
            return Err(Error::DuplicateName(new.to_string()));
        }

        let mut renamed = self.profiles[pos].clone();
        renamed.set_name(new);
        let mut order = self.names();
        order[pos] = new;

        self.store.save_profile(&renamed)?;
        if let Err(e) = self.store.save_order(&order) {
            let _ = self.store.delete_profile(new);
            return Err(e);
        }
        if let Err(e) = self.store.delete_profile(old) {
            // a leftover old file would load again as a second profile
            let _ = self.save_order();
            let _ = self.store.delete_profile(new);
            return Err(e);
        }

        self.profiles[pos] = renamed;
        tracing::info!("renamed profile '{}' to '{}'", old, new);
        Ok(())
    }

    /// Profiles in activation order; the first one is current.
    pub fn list(&self) -> Vec<ProfileSummary> {
        self.profiles
            .iter()
            .enumerate()
            .map(|(i, p)| ProfileSummary {
                name: p.name().to_string(),
                current: i == 0,
                collections: p.collections().len(),
                history: p.history().size(),
            })
            .collect()
    }

    /// Writes every profile and the ordering file.
    pub fn save(&self) -> Result<()> {
        for profile in self.profiles.iter() {
            self.store.save_profile(profile)?;
        }
        self.save_order()
    }

    fn save_order(&self) -> Result<()> {
        self.store.save_order(&self.names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::history::CallRecord;
    use crate::http::{Headers, HttpMethod, RequestSnapshot, ResponseSnapshot};
    use tempfile::tempdir;

    fn names(manager: &ProfileManager) -> Vec<String> {
        manager.list().into_iter().map(|s| s.name).collect()
    }

    fn call(url: &str) -> CallRecord {
        CallRecord::new(
            RequestSnapshot {
                method: HttpMethod::Get,
                url: url.to_string(),
                headers: Headers::new(),
                body: String::new(),
            },
            ResponseSnapshot {
                status: 200,
                headers: Headers::new(),
                body: String::new(),
            },
        )
    }

    #[test]
    fn init_on_empty_dir_synthesizes_default() {
        let dir = tempdir().unwrap();
        let (manager, errors) = ProfileManager::init(dir.path()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().name(), DEFAULT_PROFILE);
        assert!(dir.path().join("profiles/default.json").exists());
    }

    #[test]
    fn create_then_use_makes_profile_current() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();

        for name in ["a", "b2", "123"] {
            manager.create(name).unwrap();
            assert_eq!(manager.current().name(), name);
        }
        manager.use_profile("a").unwrap();
        assert_eq!(manager.current().name(), "a");
        assert_eq!(names(&manager), vec!["a", "123", "b2", "default"]);
        assert!(manager.list()[0].current);
        assert!(!manager.list()[1].current);
    }

    #[test]
    fn create_with_invalid_name_changes_nothing() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();

        let err = manager.create("Bad Name").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().name(), DEFAULT_PROFILE);
    }

    #[test]
    fn create_duplicate_fails() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("work").unwrap();
        manager.use_profile("default").unwrap();

        let err = manager.create("work").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
        assert_eq!(manager.current().name(), "default");
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn use_unknown_profile_fails() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        assert_eq!(
            manager.use_profile("ghost").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn removing_current_promotes_next() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();
        manager.create("b").unwrap();

        manager.remove("b").unwrap();
        assert_eq!(manager.current().name(), "a");
        assert!(!dir.path().join("profiles/b.json").exists());
        assert_eq!(manager.remove("b").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn removing_last_profile_leaves_a_default() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager
            .update_current(|p| p.environment_mut().user_mut().set("K", "v"))
            .unwrap();

        manager.remove(DEFAULT_PROFILE).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().name(), DEFAULT_PROFILE);
        assert!(manager.current().environment().user().is_empty());
        assert!(dir.path().join("profiles/default.json").exists());
    }

    #[test]
    fn rename_moves_file_and_keeps_contents() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();
        manager
            .update_current(|p| {
                p.history_mut().add(call("http://x"));
                Ok(())
            })
            .unwrap();

        manager.rename("a", "b").unwrap();
        assert_eq!(
            manager.use_profile("a").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        manager.use_profile("b").unwrap();
        assert_eq!(manager.current().name(), "b");
        assert_eq!(manager.current().history().size(), 1);
        assert!(!dir.path().join("profiles/a.json").exists());
        assert!(dir.path().join("profiles/b.json").exists());
    }

    #[test]
    fn rename_validates_names() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();

        assert_eq!(
            manager.rename("a", "Nope").unwrap_err().kind(),
            ErrorKind::InvalidName
        );
        assert_eq!(
            manager.rename("a", "default").unwrap_err().kind(),
            ErrorKind::DuplicateName
        );
        assert_eq!(
            manager.rename("zz", "yy").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(names(&manager), vec!["a", "default"]);
    }

    #[test]
    fn save_then_init_restores_profiles_and_order() {
        let dir = tempdir().unwrap();
        {
            let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
            manager.create("a").unwrap();
            manager.create("b").unwrap();
            manager.use_profile("a").unwrap();
            manager
                .update_current(|profile| {
                    profile.environment_mut().user_mut().set("APIKEY", "abc")?;
                    profile.scratch_template_mut().url = "http://x/{{User.APIKEY}}".into();
                    profile.history_mut().add(call("http://1"));
                    profile.history_mut().add(call("http://2"));
                    Ok(())
                })
                .unwrap();
            manager.save().unwrap();
        }

        let (manager, errors) = ProfileManager::init(dir.path()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(names(&manager), vec!["a", "b", "default"]);

        let current = manager.current();
        assert_eq!(current.environment().user().get("APIKEY"), Some(&"abc".to_string()));
        assert_eq!(
            current.scratch_template().unwrap().url,
            "http://x/{{User.APIKEY}}"
        );
        assert_eq!(current.history().get(0).unwrap().request().url, "http://2");
        assert_eq!(current.history().get(1).unwrap().request().url, "http://1");
    }

    #[test]
    fn init_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        {
            let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
            manager.create("good").unwrap();
        }
        std::fs::write(dir.path().join("profiles/broken.json"), "][").unwrap();

        let (manager, errors) = ProfileManager::init(dir.path()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Persistence);
        assert_eq!(names(&manager), vec!["good", "default"]);
    }

    #[test]
    fn init_with_only_corrupt_files_synthesizes_default() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        std::fs::write(dir.path().join("profiles/broken.json"), "nope").unwrap();

        let (manager, errors) = ProfileManager::init(dir.path()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(manager.current().name(), DEFAULT_PROFILE);
    }

    #[test]
    fn unreadable_state_dir_is_fatal() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        assert!(ProfileManager::init(&file).is_err());
    }

    /// Replaces a profile file with a directory so that writing it fails.
    fn block_profile_file(dir: &Path, name: &str) {
        let path = dir.join("profiles").join(format!("{name}.json"));
        let _ = std::fs::remove_file(&path);
        std::fs::create_dir_all(path.join("keep")).unwrap();
    }

    #[test]
    fn init_moves_corrupt_default_aside_instead_of_overwriting_it() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        let truncated = r#"{"name":"default","environment":{"user":{"TOK"#;
        std::fs::write(dir.path().join("profiles/default.json"), truncated).unwrap();

        let (manager, errors) = ProfileManager::init(dir.path()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(manager.current().name(), DEFAULT_PROFILE);
        let backup = dir.path().join("profiles/default.json.corrupt");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), truncated);
    }

    #[test]
    fn failed_update_leaves_current_profile_untouched() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        block_profile_file(dir.path(), DEFAULT_PROFILE);

        let err = manager
            .update_current(|p| p.environment_mut().user_mut().set("A", "1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(manager.current().environment().user().is_empty());
    }

    #[test]
    fn failed_removal_of_last_profile_keeps_it() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();
        manager.remove(DEFAULT_PROFILE).unwrap();
        block_profile_file(dir.path(), DEFAULT_PROFILE);

        assert!(manager.remove("a").is_err());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().name(), "a");
        assert!(dir.path().join("profiles/a.json").is_file());

        let (reloaded, _) = ProfileManager::init(dir.path()).unwrap();
        assert_eq!(names(&reloaded), vec!["a"]);
    }

    #[test]
    fn failed_removal_restores_order() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();
        block_profile_file(dir.path(), "a");

        assert!(manager.remove("a").is_err());
        assert_eq!(names(&manager), vec!["a", "default"]);
        let order = std::fs::read_to_string(dir.path().join("order.json")).unwrap();
        assert!(order.contains("\"a\""));
    }

    #[test]
    fn failed_rename_is_rolled_back() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        manager.create("a").unwrap();
        // the old file cannot be deleted once it is a non-empty directory
        block_profile_file(dir.path(), "a");

        assert!(manager.rename("a", "b").is_err());
        assert_eq!(names(&manager), vec!["a", "default"]);
        assert!(!dir.path().join("profiles/b.json").exists());
        let order = std::fs::read_to_string(dir.path().join("order.json")).unwrap();
        assert!(order.contains("\"a\""));
        assert!(!order.contains("\"b\""));
    }

    #[test]
    fn failed_create_changes_nothing() {
        let dir = tempdir().unwrap();
        let (mut manager, _) = ProfileManager::init(dir.path()).unwrap();
        block_profile_file(dir.path(), "work");

        assert!(manager.create("work").is_err());
        assert_eq!(names(&manager), vec!["default"]);
    }
}
