use crate::error::{Error, Result};
use crate::http::{first_header_value, RequestSnapshot, ResponseSnapshot};

use serde::{Deserialize, Serialize};

/// One completed call. Fields are only readable once the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    request: RequestSnapshot,
    response: ResponseSnapshot,
}

impl CallRecord {
    pub fn new(request: RequestSnapshot, response: ResponseSnapshot) -> Self {
        CallRecord { request, response }
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn response(&self) -> &ResponseSnapshot {
        &self.response
    }

    /// `<method> <url> [<content-type>]`, suitable for re-issuing the call.
    pub fn replay_command(&self) -> String {
        let mut cmd = format!("{} {}", self.request.method, self.request.url);
        if let Some(content_type) = first_header_value(&self.request.headers, "Content-Type") {
            cmd.push(' ');
            cmd.push_str(content_type);
        }
        cmd
    }

    fn summary(&self) -> String {
        format!(
            "{} {} -> {}",
            self.request.method, self.request.url, self.response.status
        )
    }
}

/// Append-only call log. Index 0 is the newest record.
///
/// Records are kept oldest-first internally so that appending never moves
/// existing entries; indices are translated on access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    calls: Vec<CallRecord>,
}

impl History {
    pub fn add(&mut self, record: CallRecord) {
        self.calls.push(record);
    }

    pub fn get(&self, index: usize) -> Result<&CallRecord> {
        let size = self.size();
        if index >= size {
            return Err(Error::OutOfRange { index, size });
        }
        Ok(&self.calls[size - 1 - index])
    }

    pub fn size(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().rev()
    }

    pub fn report(&self) -> String {
        self.iter()
            .enumerate()
            .map(|(i, call)| format!("{}: {}\n", i, call.summary()))
            .collect()
    }
}
