//! The immutable parsed form of one agent submission.

use crate::error::{ModelError, ModelResult};
use crate::sink::{hash_stacks, Sink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A case-insensitive, multi-valued header map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderMap(HashMap<String, Vec<String>>);

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a header by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .entry(name.into().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// A multi-valued parameter/query/form map, keyed by parameter name.
pub type MultiMap = HashMap<String, Vec<String>>;

pub fn sorted_keys(map: &MultiMap) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub language: String,
    pub name: String,
    pub version: String,
    pub os: String,
}

/// The raw agent wire submission: a top-level object with required
/// `context` and `hook_info` keys.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSubmission {
    pub context: AgentContext,
    pub hook_info: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentContext {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub json: Option<serde_json::Value>,
    pub server: ServerDescriptor,
    pub body: Option<serde_json::Value>,
    pub method: String,
    pub querystring: String,
    pub path: String,
    pub parameter: MultiMap,
    pub header: HashMap<String, serde_json::Value>,
    pub nic: Vec<String>,
    pub hostname: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub app_base_path: String,
    #[serde(default)]
    pub upload_files: Vec<UploadedFile>,
}

/// Immutable parsed form of one agent submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub request_id: String,
    pub scan_request_id: String,
    pub host: String,
    pub port: u16,
    pub method: String,
    pub path: String,
    pub raw_query: String,
    pub query: MultiMap,
    pub headers: HeaderMap,
    pub cookie: String,
    pub json_body: Option<serde_json::Value>,
    pub raw_body: Vec<u8>,
    pub content_type: String,
    pub content_length: usize,
    pub parameters: MultiMap,
    pub files: Vec<UploadedFile>,
    pub server: ServerDescriptor,
    pub server_hostname: String,
    pub server_nic: Vec<String>,
    pub app_base_path: String,
    pub sinks: Vec<Sink>,
}

impl Record {
    /// Parses and validates a raw agent submission against the Record
    /// schema. `scan_request_id` comes from the `scan-request-id` header
    ///, empty for observed traffic.
    pub fn from_submission(
        submission: AgentSubmission,
        scan_request_id: String,
    ) -> ModelResult<Record> {
        let ctx = submission.context;
        if ctx.hostname.is_empty() {
            return Err(ModelError::Hostless);
        }

        let mut headers = HeaderMap::new();
        for (k, v) in ctx.header {
            match v {
                serde_json::Value::String(s) => headers.insert(k, s),
                serde_json::Value::Array(items) => {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            headers.insert(k.clone(), s.to_string());
                        }
                    }
                }
                other => headers.insert(k, other.to_string()),
            }
        }

        let query = parse_query_string(&ctx.querystring);

        let raw_body = match &ctx.body {
            Some(serde_json::Value::String(s)) => s.clone().into_bytes(),
            Some(other) => other.to_string().into_bytes(),
            None => Vec::new(),
        };
        let content_length = raw_body.len();

        let sinks: Vec<Sink> = submission
            .hook_info
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();

        Ok(Record {
            request_id: ctx.request_id,
            scan_request_id,
            host: ctx.hostname.clone(),
            port: ctx.port,
            method: ctx.method.to_ascii_lowercase(),
            path: ctx.path,
            raw_query: ctx.querystring,
            query,
            headers,
            cookie: ctx.cookie,
            json_body: ctx.json,
            raw_body,
            content_type: ctx.content_type,
            content_length,
            parameters: ctx.parameter,
            files: ctx.upload_files,
            server: ctx.server,
            server_hostname: ctx.hostname,
            server_nic: ctx.nic,
            app_base_path: ctx.app_base_path,
            sinks,
        })
    }

    /// `true` iff this Record is a replay.
    pub fn is_replay(&self) -> bool {
        !self.scan_request_id.is_empty()
    }

    /// The leading segment of `scan_request_id` before the first `-`, which
    /// identifies the target scanner's inbox.
    pub fn inbox_id(&self) -> Option<&str> {
        if self.scan_request_id.is_empty() {
            return None;
        }
        self.scan_request_id.split('-').next()
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// MD5 hex over the concatenation of every sink's call stack, in sink
    /// order.
    pub fn stack_hash(&self) -> String {
        hash_stacks(self.sinks.iter().filter_map(|s| s.stack()))
    }

    pub fn combined_url_with_query(&self) -> String {
        if self.raw_query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.raw_query)
        }
    }
}

fn parse_query_string(qs: &str) -> MultiMap {
    let mut map: MultiMap = MultiMap::new();
    for pair in qs.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        let key = percent_decode(key);
        let value = percent_decode(value);
        map.entry(key).or_default().push(value);
    }
    map
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_parses_multi_values() {
        let map = parse_query_string("id=1&id=2&name=a%20b");
        assert_eq!(map.get("id").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(map.get("name").unwrap(), &vec!["a b".to_string()]);
    }

    #[test]
    fn header_map_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Scan-Request-Id", "0-abc");
        assert_eq!(headers.get_first("scan-request-id"), Some("0-abc"));
        assert_eq!(headers.get_first("SCAN-REQUEST-ID"), Some("0-abc"));
    }

    #[test]
    fn inbox_id_is_leading_segment() {
        let mut rec = sample_record();
        rec.scan_request_id = "3-9f8c-uuid".to_string();
        assert_eq!(rec.inbox_id(), Some("3"));
    }

    #[test]
    fn observed_record_has_no_inbox() {
        let rec = sample_record();
        assert!(!rec.is_replay());
        assert_eq!(rec.inbox_id(), None);
    }

    fn sample_record() -> Record {
        Record {
            request_id: "r1".into(),
            scan_request_id: String::new(),
            host: "x.com".into(),
            port: 80,
            method: "get".into(),
            path: "/a".into(),
            raw_query: "id=1".into(),
            query: parse_query_string("id=1"),
            headers: HeaderMap::new(),
            cookie: String::new(),
            json_body: None,
            raw_body: Vec::new(),
            content_type: String::new(),
            content_length: 0,
            parameters: MultiMap::new(),
            files: Vec::new(),
            server: ServerDescriptor::default(),
            server_hostname: "host1".into(),
            server_nic: Vec::new(),
            app_base_path: "/var/www".into(),
            sinks: Vec::new(),
        }
    }
}
