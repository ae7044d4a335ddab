//! Variable sources and `{{Namespace.Key}}` token expansion.
//!
//! A profile carries exactly three sources, one per fixed namespace:
//!
//! * `Var`  - snapshot of the process environment, re-sampled on every load
//! * `Home` - entries loaded from a `KEY=VALUE` file
//! * `User` - variables defined interactively
//!
//! Tokens that cannot be resolved are left in the text untouched.

use crate::error::{Error, Result};

use ini::Ini;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

const REGEX_PATTERN_TOKEN: &str = r"\{\{(?P<namespace>[^{}.]+)\.(?P<key>[^{}]+)\}\}";

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(REGEX_PATTERN_TOKEN).expect("token pattern is valid"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Var,
    Home,
    User,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Var, SourceKind::Home, SourceKind::User];

    pub fn namespace(&self) -> &'static str {
        match self {
            SourceKind::Var => "Var",
            SourceKind::Home => "Home",
            SourceKind::User => "User",
        }
    }

    pub fn from_namespace(ns: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.namespace() == ns)
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace())
    }
}

/// A single namespace of variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSource {
    kind: SourceKind,
    mapping: BTreeMap<String, String>,
}

impl VariableSource {
    pub fn new(kind: SourceKind) -> Self {
        VariableSource {
            kind,
            mapping: BTreeMap::new(),
        }
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        VariableSource {
            kind: SourceKind::Var,
            mapping: std::env::vars().collect(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.namespace()
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.mapping.get(key)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.mapping.iter()
    }

    #[cfg(test)]
    pub(crate) fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.mapping.insert(key.to_string(), value.to_string());
        self
    }

    /// Only the `User` source accepts writes.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey);
        }
        if self.kind != SourceKind::User {
            return Err(Error::Validation(format!(
                "the {} environment is read-only",
                self.kind
            )));
        }
        self.mapping.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replaces the mapping with the entries of an ini-style `KEY=VALUE` file.
    pub fn populate_from_file(&mut self, file_path: &str) -> Result<()> {
        let path = shellexpand::tilde(file_path).to_string();
        let ini = Ini::load_from_file(&path).map_err(|e| match e {
            ini::Error::Io(source) => Error::io(&path, source),
            ini::Error::Parse(p) => Error::Validation(format!("{path}: {p}")),
        })?;

        // section-less entries only
        self.mapping = ini
            .general_section()
            .iter()
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        tracing::debug!("loaded {} variables from {}", self.mapping.len(), path);
        Ok(())
    }

    /// Resolves only the tokens in this source's namespace.
    pub fn expand(&self, text: &str) -> String {
        expand_with(text, |ns, key| {
            if ns == self.name() {
                self.get(key).cloned()
            } else {
                None
            }
        })
    }

    fn dump_into(&self, out: &mut String) {
        for (key, value) in self.mapping.iter() {
            out.push_str(&format!("{}.{}={}\n", self.name(), key, value));
        }
    }
}

/// Single left-to-right pass. Replacement text is never scanned again.
fn expand_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str, &str) -> Option<String>,
{
    token_regex()
        .replace_all(text, |caps: &Captures| {
            lookup(&caps["namespace"], &caps["key"]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn expand_all(text: &str, sources: &[&VariableSource]) -> String {
    expand_with(text, |ns, key| {
        sources
            .iter()
            .find(|s| s.name() == ns)
            .and_then(|s| s.get(key).cloned())
    })
}

fn process_source() -> VariableSource {
    VariableSource::from_process()
}

fn home_source() -> VariableSource {
    VariableSource::new(SourceKind::Home)
}

fn user_source() -> VariableSource {
    VariableSource::new(SourceKind::User)
}

/// The three sources owned by one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    #[serde(skip, default = "process_source")]
    os: VariableSource,
    #[serde(default = "home_source")]
    home: VariableSource,
    #[serde(default = "user_source")]
    user: VariableSource,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            os: process_source(),
            home: home_source(),
            user: user_source(),
        }
    }
}

impl Environment {
    pub fn os(&self) -> &VariableSource {
        &self.os
    }

    pub fn home(&self) -> &VariableSource {
        &self.home
    }

    pub fn home_mut(&mut self) -> &mut VariableSource {
        &mut self.home
    }

    pub fn user(&self) -> &VariableSource {
        &self.user
    }

    pub fn user_mut(&mut self) -> &mut VariableSource {
        &mut self.user
    }

    pub fn source(&self, kind: SourceKind) -> &VariableSource {
        match kind {
            SourceKind::Var => &self.os,
            SourceKind::Home => &self.home,
            SourceKind::User => &self.user,
        }
    }

    pub fn expand(&self, text: &str) -> String {
        expand_all(text, &[&self.os, &self.home, &self.user])
    }

    /// `Ns.KEY=VALUE` lines. An empty namespace dumps User, Var and Home in
    /// that order; an unknown namespace dumps nothing.
    pub fn dump(&self, namespace: &str) -> String {
        let mut out = String::new();
        if namespace.is_empty() {
            for kind in [SourceKind::User, SourceKind::Var, SourceKind::Home] {
                self.source(kind).dump_into(&mut out);
            }
        } else if let Some(kind) = SourceKind::from_namespace(namespace) {
            self.source(kind).dump_into(&mut out);
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn with_os(mut self, os: VariableSource) -> Self {
        self.os = os;
        self
    }
}
