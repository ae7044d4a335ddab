use crate::decoder::{decode_body, decode_text, ContentEncoding};
use crate::error::{Error, Result};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Header name to every value sent for it, in order.
pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Head => Method::HEAD,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| Error::UnsupportedMethod(s.to_string()))
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses `Key: Value` lines. Blank lines are skipped, repeated keys keep
/// every value, and every line that does not split is reported at once.
pub fn parse_header_text(text: &str) -> Result<Headers> {
    let mut headers = Headers::new();
    let mut errors = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                headers
                    .entry(key.trim().to_string())
                    .or_default()
                    .push(value.trim().to_string());
            }
            _ => errors.push(format!("could not split header line '{line}'")),
        }
    }

    if errors.is_empty() {
        Ok(headers)
    } else {
        Err(Error::Validation(errors.join("\n")))
    }
}

/// First value of a header, with the name matched case-insensitively.
pub fn first_header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
}

/// The request exactly as it went out on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
}

impl ResponseSnapshot {
    pub fn reason(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }
}

/// Shared blocking client. It carries no per-profile state and imposes no
/// timeout on requests.
pub struct HttpClient {
    client: Client,
}

impl Debug for HttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &"Client")
            .finish()
    }
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::build(true)
    }

    /// Ignores `HTTP_PROXY` and friends; every request goes out directly.
    pub fn without_proxy() -> Result<Self> {
        Self::build(false)
    }

    fn build(system_proxy: bool) -> Result<Self> {
        let mut builder = Client::builder().timeout(None::<Duration>);
        if !system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(Error::Transport)?;
        Ok(HttpClient { client })
    }

    pub fn send(&self, req: &RequestSnapshot) -> Result<ResponseSnapshot> {
        let headers = Self::build_headers(&req.headers)?;
        let mut builder = self
            .client
            .request(req.method.to_reqwest(), req.url.as_str())
            .headers(headers);
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }
        let request = builder
            .build()
            .map_err(|e| Error::Validation(format!("invalid request: {e}")))?;

        tracing::debug!("> {} {}", req.method, req.url);
        let start_time = Instant::now();
        let res = self.client.execute(request).map_err(Error::Transport)?;

        let status = res.status();
        let headers = Self::collect_headers(res.headers());
        let encoding = ContentEncoding::from_header(
            res.headers()
                .get(CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );
        let body_bytes = res.bytes().map_err(Error::Transport)?;
        let body = decode_body(&body_bytes, encoding).unwrap_or_else(|e| {
            tracing::warn!("could not decode {:?} body, showing it as is: {}", encoding, e);
            decode_text(&body_bytes)
        });

        tracing::debug!(
            "< {} ({} bytes, {}ms)",
            status,
            body_bytes.len(),
            start_time.elapsed().as_millis()
        );

        Ok(ResponseSnapshot {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    fn build_headers(headers: &Headers) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (key, values) in headers.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| Error::Validation(format!("invalid header name '{key}'")))?;
            for value in values.iter() {
                let value = HeaderValue::from_str(value).map_err(|_| {
                    Error::Validation(format!("invalid value for header '{key}': '{value}'"))
                })?;
                map.append(name.clone(), value);
            }
        }
        Ok(map)
    }

    fn collect_headers(map: &HeaderMap) -> Headers {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        headers
    }
}
