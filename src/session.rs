use crate::error::{Error, Result};
use crate::history::CallRecord;
use crate::http::{parse_header_text, HttpClient, HttpMethod};
use crate::manager::ProfileManager;
use crate::profile::{Profile, ProfileSummary};
use crate::template::RequestTemplate;

use std::path::PathBuf;

/// The core object the presentation layer talks to. It owns the profiles
/// and the one HTTP client shared by every call, and saves after every
/// command that changes state.
#[derive(Debug)]
pub struct Session {
    profiles: ProfileManager,
    client: HttpClient,
}

fn split_key_value(kv: &str) -> Result<(&str, &str)> {
    kv.split_once('=')
        .ok_or_else(|| Error::Validation(format!("expected KEY=VALUE, got '{kv}'")))
}

impl Session {
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<(Self, Vec<Error>)> {
        Self::with_client(state_dir, HttpClient::new()?)
    }

    pub fn with_client(
        state_dir: impl Into<PathBuf>,
        client: HttpClient,
    ) -> Result<(Self, Vec<Error>)> {
        let (profiles, errors) = ProfileManager::init(state_dir)?;
        Ok((Session { profiles, client }, errors))
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn current(&self) -> &Profile {
        self.profiles.current()
    }

    /// Issues a request through the current profile's scratch template.
    ///
    /// The template is only updated, and the call only recorded, once the
    /// request went through; a failed call leaves the profile as it was.
    pub fn call(
        &mut self,
        method: &str,
        url: &str,
        body: &str,
        header_text: &str,
    ) -> Result<CallRecord> {
        let method: HttpMethod = method.parse()?;
        let headers = parse_header_text(header_text)?;

        let template = RequestTemplate {
            method,
            url: url.to_string(),
            headers,
            body: body.to_string(),
        };

        let record = template.execute(&self.client, self.current().environment())?;
        tracing::info!(
            "{} {} -> {}",
            record.request().method,
            record.request().url,
            record.response().status
        );

        self.profiles.update_current(|profile| {
            *profile.scratch_template_mut() = template;
            profile.history_mut().add(record.clone());
            Ok(())
        })?;
        Ok(record)
    }

    /// `KEY=VALUE`; replaces every value of the header on the scratch template.
    pub fn set_header(&mut self, kv: &str) -> Result<()> {
        let (key, value) = split_key_value(kv)?;
        self.profiles
            .update_current(|p| p.scratch_template_mut().set_header(key, value))
    }

    pub fn remove_header(&mut self, key: &str) -> Result<()> {
        self.profiles.update_current(|p| {
            match p.scratch_template_mut().remove_header(key) {
                Some(_) => Ok(()),
                None => Err(Error::Validation(format!("header '{key}' is not set"))),
            }
        })
    }

    pub fn clear_headers(&mut self) -> Result<()> {
        self.profiles.update_current(|p| {
            p.scratch_template_mut().headers.clear();
            Ok(())
        })
    }

    /// Headers of the scratch template as `Key: Value` lines.
    pub fn header_text(&self) -> String {
        let mut out = String::new();
        if let Some(template) = self.current().scratch_template() {
            for (key, values) in template.headers.iter() {
                for value in values {
                    out.push_str(&format!("{key}: {value}\n"));
                }
            }
        }
        out
    }

    /// `KEY=VALUE` into the `User` namespace.
    pub fn set_user_var(&mut self, kv: &str) -> Result<()> {
        let (key, value) = split_key_value(kv)?;
        self.profiles
            .update_current(|p| p.environment_mut().user_mut().set(key, value))
    }

    /// Sets each pair in turn; one failure does not stop the rest.
    pub fn set_user_vars<S: AsRef<str>>(&mut self, pairs: &[S]) -> Vec<(String, Result<()>)> {
        pairs
            .iter()
            .map(|kv| {
                let kv = kv.as_ref();
                (kv.to_string(), self.set_user_var(kv))
            })
            .collect()
    }

    /// Loads the `Home` namespace of the current profile from a file.
    pub fn load_home_file(&mut self, path: &str) -> Result<()> {
        self.profiles
            .update_current(|p| p.environment_mut().home_mut().populate_from_file(path))
    }

    pub fn dump_env(&self, namespace: &str) -> String {
        self.current().environment().dump(namespace)
    }

    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        self.profiles.list()
    }

    pub fn create_profile(&mut self, name: &str) -> Result<()> {
        self.profiles.create(name).map(|_| ())
    }

    pub fn use_profile(&mut self, name: &str) -> Result<()> {
        self.profiles.use_profile(name).map(|_| ())
    }

    /// Removes each profile in turn; one failure does not stop the rest.
    pub fn remove_profiles<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<(String, Result<()>)> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.profiles.remove(name))
            })
            .collect()
    }

    pub fn rename_profile(&mut self, old: &str, new: &str) -> Result<()> {
        self.profiles.rename(old, new)
    }

    pub fn history_size(&self) -> usize {
        self.current().history().size()
    }

    pub fn history_get(&self, index: usize) -> Result<&CallRecord> {
        self.current().history().get(index)
    }

    pub fn history_report(&self) -> String {
        self.current().history().report()
    }

    /// Command line that re-issues history entry `index`.
    pub fn replay(&self, index: usize) -> Result<String> {
        self.history_get(index).map(|r| r.replay_command())
    }

    pub fn save(&self) -> Result<()> {
        self.profiles.save()
    }
}
