use crate::env::Environment;
use crate::error::{Error, Result};
use crate::history::History;
use crate::template::{Collection, RequestTemplate, DEFAULT_COLLECTION};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_PROFILE: &str = "default";

const REGEX_PATTERN_PROFILE_NAME: &str = "^[a-z0-9]+$";

pub fn validate_name(name: &str) -> Result<()> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let re = NAME.get_or_init(|| {
        Regex::new(REGEX_PATTERN_PROFILE_NAME).expect("profile name pattern is valid")
    });
    if re.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    name: String,
    #[serde(default)]
    collections: Vec<Collection>,
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    history: History,
}

impl Profile {
    pub fn new(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Profile {
            name: name.to_string(),
            collections: Vec::new(),
            environment: Environment::default(),
            history: History::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// The template edited by the command surface: first template of the
    /// first collection, created on demand.
    pub fn scratch_template_mut(&mut self) -> &mut RequestTemplate {
        if self.collections.is_empty() {
            self.collections.push(Collection::new(DEFAULT_COLLECTION));
        }
        let collection = &mut self.collections[0];
        if collection.templates.is_empty() {
            collection.templates.push(RequestTemplate::default());
        }
        &mut collection.templates[0]
    }

    pub fn scratch_template(&self) -> Option<&RequestTemplate> {
        self.collections.first().and_then(|c| c.templates.first())
    }
}

/// A listing entry for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: String,
    pub current: bool,
    pub collections: usize,
    pub history: usize,
}
