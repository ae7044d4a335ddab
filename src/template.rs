use crate::env::Environment;
use crate::error::{Error, Result};
use crate::history::CallRecord;
use crate::http::{Headers, HttpClient, HttpMethod, RequestSnapshot};

use serde::{Deserialize, Serialize};

pub const DEFAULT_COLLECTION: &str = "default";

/// An editable request. Url, header values and body may carry
/// `{{Namespace.Key}}` tokens that are resolved at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: HttpMethod,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
}

impl RequestTemplate {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        RequestTemplate {
            method,
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Replaces every value of `key` with `value`.
    pub fn set_header(&mut self, key: &str, value: &str) -> Result<()> {
        let key = Self::header_key(key)?;
        self.headers.insert(key, vec![value.to_string()]);
        Ok(())
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> Result<()> {
        let key = Self::header_key(key)?;
        self.headers.entry(key).or_default().push(value.to_string());
        Ok(())
    }

    pub fn remove_header(&mut self, key: &str) -> Option<Vec<String>> {
        self.headers.remove(key.trim())
    }

    fn header_key(key: &str) -> Result<String> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Validation("header name must not be empty".to_string()));
        }
        // header text is rendered as `Key: Value`
        if key.contains(':') {
            return Err(Error::Validation(format!(
                "header name '{key}' must not contain ':'"
            )));
        }
        Ok(key.to_string())
    }

    /// Resolves every token against `env` without touching the template.
    pub fn expand(&self, env: &Environment) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method,
            url: env.expand(&self.url),
            headers: self
                .headers
                .iter()
                .map(|(key, values)| {
                    (
                        key.clone(),
                        values.iter().map(|v| env.expand(v)).collect(),
                    )
                })
                .collect(),
            body: env.expand(&self.body),
        }
    }

    /// Sends the expanded request. A transport failure yields no record.
    pub fn execute(&self, client: &HttpClient, env: &Environment) -> Result<CallRecord> {
        let request = self.expand(env);
        let response = client.send(&request)?;
        Ok(CallRecord::new(request, response))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub templates: Vec<RequestTemplate>,
}

impl Collection {
    pub fn new(name: &str) -> Self {
        Collection {
            name: name.to_string(),
            templates: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{SourceKind, VariableSource};

    fn env_with_user(pairs: &[(&str, &str)]) -> Environment {
        let mut env = Environment::default().with_os(VariableSource::new(SourceKind::Var));
        for (k, v) in pairs {
            env.user_mut().set(k, v).unwrap();
        }
        env
    }

    #[test]
    fn expand_resolves_url_headers_and_body() {
        let env = env_with_user(&[("APIKEY", "abc123"), ("TOKEN", "t0k")]);
        let mut template = RequestTemplate::new(HttpMethod::Post, "http://x/{{User.APIKEY}}");
        template.add_header("Authorization", "Bearer {{User.TOKEN}}").unwrap();
        template.add_header("Accept", "a/{{User.MISSING}}").unwrap();
        template.add_header("Accept", "b").unwrap();
        template.body = r#"{"key":"{{User.APIKEY}}"}"#.to_string();

        let snapshot = template.expand(&env);
        assert_eq!(snapshot.method, HttpMethod::Post);
        assert_eq!(snapshot.url, "http://x/abc123");
        assert_eq!(snapshot.headers["Authorization"], vec!["Bearer t0k".to_string()]);
        assert_eq!(
            snapshot.headers["Accept"],
            vec!["a/{{User.MISSING}}".to_string(), "b".to_string()]
        );
        assert_eq!(snapshot.body, r#"{"key":"abc123"}"#);

        // the template itself keeps its tokens
        assert_eq!(template.url, "http://x/{{User.APIKEY}}");
    }

    #[test]
    fn set_header_replaces_all_values() {
        let mut template = RequestTemplate::default();
        template.add_header("Accept", "a").unwrap();
        template.add_header("Accept", "b").unwrap();
        template.set_header("Accept", "c").unwrap();
        assert_eq!(template.headers["Accept"], vec!["c".to_string()]);
    }

    #[test]
    fn empty_header_name_is_rejected() {
        let mut template = RequestTemplate::default();
        assert!(matches!(
            template.set_header("  ", "x"),
            Err(Error::Validation(_))
        ));
        assert!(template.headers.is_empty());
    }

    #[test]
    fn header_name_with_colon_is_rejected() {
        let mut template = RequestTemplate::default();
        assert!(matches!(
            template.set_header("a:b", "v"),
            Err(Error::Validation(_))
        ));
        assert!(template.add_header("a:", "v").is_err());
        assert!(template.headers.is_empty());
    }

    #[test]
    fn remove_header_returns_old_values() {
        let mut template = RequestTemplate::default();
        template.set_header("X-A", "1").unwrap();
        assert_eq!(template.remove_header("X-A"), Some(vec!["1".to_string()]));
        assert_eq!(template.remove_header("X-A"), None);
    }

    #[test]
    fn template_round_trips_through_json_with_multi_values() {
        let mut template = RequestTemplate::new(HttpMethod::Delete, "http://h/{{Var.X}}");
        template.add_header("Accept", "a").unwrap();
        template.add_header("Accept", "b").unwrap();
        let json = serde_json::to_string(&template).unwrap();
        let back: RequestTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, template);
    }
}
